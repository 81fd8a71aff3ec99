//! Consume loop
//!
//! Fetches one message at a time, decodes it, hands it to the processor and
//! commits it. Messages from a partition are handled strictly in fetch order.
//!
//! Commit policy:
//! - undecodable payloads are committed so a poison message cannot stall the partition
//! - processed messages are committed whether processing succeeded or failed
//! - messages whose processing was cut short by shutdown are left uncommitted
//!   and will be redelivered

use super::decoder::MessageDecoder;
use super::source::{MessageSource, SourceError, SourceMessage};
use crate::metrics;
use crate::services::processor::{CommandProcessor, ErrorKind, ProcessingContext};
use crate::shutdown::ShutdownSignal;
use crate::stats::ServiceStats;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const DEFAULT_FETCH_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Running,
    Draining,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerEvent {
    Cancelled,
    Fetched,
    FetchFailed,
    FatalError,
    SourceClosed,
}

/// Next loop state for an event
pub fn transition(state: ConsumerState, event: ConsumerEvent) -> ConsumerState {
    use ConsumerEvent::*;
    use ConsumerState::*;

    match (state, event) {
        (Running, Fetched | FetchFailed) => Running,
        (Running, Cancelled | FatalError) => Draining,
        (Running, SourceClosed) => Closed,
        (Draining, SourceClosed) => Closed,
        (Draining, _) => Draining,
        (Closed, _) => Closed,
    }
}

/// What happened to a single fetched message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    DecodeFailed,
    Processed,
    ProcessingFailed,
    Cancelled,
}

impl MessageOutcome {
    pub fn should_commit(&self) -> bool {
        !matches!(self, MessageOutcome::Cancelled)
    }

    /// Whether the message reached the processor and ran to completion
    pub fn counts_as_processed(&self) -> bool {
        matches!(
            self,
            MessageOutcome::Processed | MessageOutcome::ProcessingFailed
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub fetched: u64,
    pub committed: u64,
    pub decode_failures: u64,
    pub processing_failures: u64,
    pub fetch_errors: u64,
    pub commit_errors: u64,
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("message source failed: {0}")]
    Source(#[from] SourceError),
}

pub struct CommandConsumer<S> {
    source: S,
    decoder: MessageDecoder,
    processor: Arc<dyn CommandProcessor>,
    stats: Arc<ServiceStats>,
    shutdown: ShutdownSignal,
    processing_timeout: Option<Duration>,
    fetch_retry_delay: Duration,
    state: ConsumerState,
}

impl<S: MessageSource> CommandConsumer<S> {
    pub fn new(
        source: S,
        decoder: MessageDecoder,
        processor: Arc<dyn CommandProcessor>,
        stats: Arc<ServiceStats>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            source,
            decoder,
            processor,
            stats,
            shutdown,
            processing_timeout: None,
            fetch_retry_delay: DEFAULT_FETCH_RETRY_DELAY,
            state: ConsumerState::Running,
        }
    }

    pub fn with_processing_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.processing_timeout = timeout;
        self
    }

    pub fn with_fetch_retry_delay(mut self, delay: Duration) -> Self {
        self.fetch_retry_delay = delay;
        self
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    fn advance(&mut self, event: ConsumerEvent) {
        let next = transition(self.state, event);
        if next != self.state {
            debug!(from = ?self.state, to = ?next, event = ?event, "Consumer state changed");
        }
        self.state = next;
    }

    /// Run until shutdown (clean exit) or a fatal source error.
    pub async fn run(mut self) -> Result<ConsumerStats, ConsumerError> {
        info!(format = %self.decoder.preferred(), "Starting command consumer");
        self.stats.set_broker_connected(true);

        let mut counters = ConsumerStats::default();
        let mut fatal = None;

        while self.state == ConsumerState::Running {
            if self.shutdown.is_triggered() {
                info!("Received stop signal, shutting down consumer");
                self.advance(ConsumerEvent::Cancelled);
                break;
            }

            let fetched = tokio::select! {
                biased;
                _ = self.shutdown.wait() => None,
                result = self.source.fetch() => Some(result),
            };

            let message = match fetched {
                None => {
                    info!("Received stop signal, shutting down consumer");
                    self.advance(ConsumerEvent::Cancelled);
                    continue;
                }
                Some(Ok(message)) => message,
                Some(Err(_)) if self.shutdown.is_triggered() => {
                    self.advance(ConsumerEvent::Cancelled);
                    continue;
                }
                Some(Err(err)) if err.is_fatal() => {
                    error!(error = %err, "Fatal message source error");
                    fatal = Some(err);
                    self.advance(ConsumerEvent::FatalError);
                    continue;
                }
                Some(Err(err)) => {
                    counters.fetch_errors += 1;
                    warn!(error = %err, "Failed to fetch message");
                    self.advance(ConsumerEvent::FetchFailed);
                    self.back_off().await;
                    continue;
                }
            };

            self.advance(ConsumerEvent::Fetched);
            counters.fetched += 1;

            if let Err(err) = self.handle(&message, &mut counters).await {
                error!(error = %err, "Fatal error while committing");
                fatal = Some(err);
                self.advance(ConsumerEvent::FatalError);
            }
        }

        if self.state == ConsumerState::Draining {
            if let Err(err) = self.source.close().await {
                warn!(error = %err, "Failed to close message source");
            }
            self.advance(ConsumerEvent::SourceClosed);
        }
        self.stats.set_broker_connected(false);

        info!(
            fetched = counters.fetched,
            committed = counters.committed,
            decode_failures = counters.decode_failures,
            processing_failures = counters.processing_failures,
            fetch_errors = counters.fetch_errors,
            "Command consumer stopped"
        );

        match fatal {
            Some(err) => Err(err.into()),
            None => Ok(counters),
        }
    }

    async fn handle(
        &mut self,
        message: &SourceMessage,
        counters: &mut ConsumerStats,
    ) -> Result<(), SourceError> {
        debug!(
            partition = message.partition,
            offset = message.offset,
            key = %message.key_str(),
            "Received message"
        );

        let outcome = match self.decoder.decode(&message.payload) {
            Err(err) => {
                error!(
                    partition = message.partition,
                    offset = message.offset,
                    key = %message.key_str(),
                    error = %err,
                    "Message decode error"
                );
                metrics::record_decode_failure();
                counters.decode_failures += 1;
                MessageOutcome::DecodeFailed
            }
            Ok(command) => {
                let mut ctx = ProcessingContext::new(self.shutdown.clone());
                if let Some(timeout) = self.processing_timeout {
                    ctx = ctx.with_timeout(timeout);
                }

                match self.processor.process(&ctx, &command).await {
                    Ok(_) => MessageOutcome::Processed,
                    Err(failure) if failure.error.kind() == ErrorKind::Cancelled => {
                        MessageOutcome::Cancelled
                    }
                    Err(failure) => {
                        error!(
                            partition = message.partition,
                            offset = message.offset,
                            command_id = %command.id,
                            error = %failure,
                            "Command processing error"
                        );
                        counters.processing_failures += 1;
                        MessageOutcome::ProcessingFailed
                    }
                }
            }
        };

        if outcome.counts_as_processed() {
            self.stats.record_processed();
        }

        if !outcome.should_commit() {
            info!(
                partition = message.partition,
                offset = message.offset,
                "Processing interrupted by shutdown, leaving message for redelivery"
            );
            return Ok(());
        }

        match self.source.commit(message).await {
            Ok(()) => {
                counters.committed += 1;
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                counters.commit_errors += 1;
                warn!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    "Failed to commit message"
                );
                Ok(())
            }
        }
    }

    async fn back_off(&self) {
        tokio::select! {
            _ = self.shutdown.wait() => {}
            _ = tokio::time::sleep(self.fetch_retry_delay) => {}
        }
    }
}
