//! Command dispatch
//!
//! A processor validates a [`Command`], runs its operation and reports the
//! outcome twice: as a [`ProcessingResult`] for bookkeeping and, on failure,
//! as a [`ProcessError`] for logging and control flow.
//!
//! CPU-bound work (decode, operation, PNG encode) runs on the blocking pool.

use super::fetcher::{FetchError, ImageFetcher};
use super::operations::{self, OperationError, OperationOutput};
use crate::metrics::ProcessingMetrics;
use crate::models::{Command, CommandType, Operation, ProcessingResult};
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use bytes::Bytes;
use image::ImageOutputFormat;
use media_storage::{ObjectStorage, StorageError};
use std::any::Any;
use std::future::Future;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const OUTPUT_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("command ID is required")]
    MissingId,

    #[error("image URL is required")]
    MissingImageUrl,

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("download failed: {0}")]
    Download(#[from] FetchError),

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("encode failed: {0}")]
    Encode(#[source] image::ImageError),

    #[error("upload failed: {0}")]
    Upload(#[from] StorageError),

    #[error("processing task failed: {0}")]
    Task(String),

    #[error("processing cancelled by shutdown")]
    Cancelled,

    #[error("processing deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid input: expected a Command")]
    InvalidInput,
}

/// Coarse classification used by logs and the consume loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Downstream,
    Cancelled,
    InvalidInput,
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::MissingId | ProcessError::MissingImageUrl | ProcessError::Operation(_) => {
                ErrorKind::Validation
            }
            ProcessError::Download(_)
            | ProcessError::Decode(_)
            | ProcessError::Encode(_)
            | ProcessError::Upload(_)
            | ProcessError::Task(_)
            | ProcessError::DeadlineExceeded => ErrorKind::Downstream,
            ProcessError::Cancelled => ErrorKind::Cancelled,
            ProcessError::InvalidInput => ErrorKind::InvalidInput,
        }
    }
}

/// Failed result together with the error that caused it
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ProcessingFailure {
    pub result: ProcessingResult,
    #[source]
    pub error: ProcessError,
}

impl ProcessingFailure {
    fn new(command_id: &str, error: ProcessError, elapsed: Duration) -> Self {
        Self {
            result: ProcessingResult::failed(command_id, error.to_string()).with_elapsed(elapsed),
            error,
        }
    }
}

/// Per-message execution context
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    shutdown: ShutdownSignal,
    deadline: Option<tokio::time::Instant>,
}

impl ProcessingContext {
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Self {
            shutdown,
            deadline: None,
        }
    }

    /// Context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::new(ShutdownSignal::never())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(tokio::time::Instant::now() + timeout);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Drive `work` until it finishes, shutdown is requested or the deadline passes
    pub async fn run<T, F>(&self, work: F) -> Result<T, ProcessError>
    where
        F: Future<Output = Result<T, ProcessError>>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.wait() => Err(ProcessError::Cancelled),
            _ = deadline => Err(ProcessError::DeadlineExceeded),
            result = work => result,
        }
    }
}

#[async_trait]
pub trait CommandProcessor: Send + Sync {
    async fn process(
        &self,
        ctx: &ProcessingContext,
        command: &Command,
    ) -> Result<ProcessingResult, ProcessingFailure>;

    /// Untyped entry point; anything other than a [`Command`] is rejected
    /// with [`ProcessError::InvalidInput`] before any processing.
    async fn process_any(
        &self,
        ctx: &ProcessingContext,
        input: Box<dyn Any + Send>,
    ) -> Result<ProcessingResult, ProcessingFailure> {
        match input.downcast::<Command>() {
            Ok(command) => self.process(ctx, &command).await,
            Err(_) => Err(ProcessingFailure::new(
                "",
                ProcessError::InvalidInput,
                Duration::ZERO,
            )),
        }
    }
}

fn validate(command: &Command) -> Result<(), ProcessError> {
    if command.id.is_empty() {
        return Err(ProcessError::MissingId);
    }
    if command.image_url.is_empty() {
        return Err(ProcessError::MissingImageUrl);
    }
    Ok(())
}

enum Rendered {
    Png(Bytes),
    Analysis { width: u32, height: u32 },
}

fn render(source: &[u8], operation: &Operation) -> Result<Rendered, ProcessError> {
    let image = image::load_from_memory(source).map_err(ProcessError::Decode)?;

    match operations::apply(&image, operation)? {
        OperationOutput::Analysis { width, height } => Ok(Rendered::Analysis { width, height }),
        OperationOutput::Image(output) => {
            let mut buffer = Cursor::new(Vec::new());
            output
                .write_to(&mut buffer, ImageOutputFormat::Png)
                .map_err(ProcessError::Encode)?;
            Ok(Rendered::Png(Bytes::from(buffer.into_inner())))
        }
    }
}

/// Downloads, transforms and stores images
pub struct ImageCommandProcessor {
    fetcher: Arc<dyn ImageFetcher>,
    storage: Arc<dyn ObjectStorage>,
    metrics: Arc<dyn ProcessingMetrics>,
}

impl ImageCommandProcessor {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        storage: Arc<dyn ObjectStorage>,
        metrics: Arc<dyn ProcessingMetrics>,
    ) -> Self {
        Self {
            fetcher,
            storage,
            metrics,
        }
    }

    async fn execute(&self, ctx: &ProcessingContext, command: &Command) -> Result<String, ProcessError> {
        validate(command)?;

        // Nothing to dispatch to, so skip the download
        if command.command_type() == CommandType::Unspecified {
            return Err(OperationError::UnknownCommand(CommandType::Unspecified).into());
        }

        let rendered = ctx.run(self.fetch_and_render(command)).await?;

        // Once started, the upload is allowed to finish so the reported
        // result always matches what is in storage.
        match rendered {
            Rendered::Analysis { width, height } => {
                info!(command_id = %command.id, width, height, "Image analyzed");
                Ok(String::new())
            }
            Rendered::Png(data) => {
                let key = format!("{}.png", command.id);
                let size = data.len();
                let location = self.storage.upload(&key, data, OUTPUT_CONTENT_TYPE).await?;
                debug!(command_id = %command.id, key = %key, size, "Processed image stored");
                Ok(location)
            }
        }
    }

    async fn fetch_and_render(&self, command: &Command) -> Result<Rendered, ProcessError> {
        let source = self.fetcher.fetch(&command.image_url).await?;
        debug!(command_id = %command.id, bytes = source.len(), "Source image fetched");

        let operation = command.operation.clone();
        tokio::task::spawn_blocking(move || render(&source, &operation))
            .await
            .map_err(|e| ProcessError::Task(e.to_string()))?
    }
}

#[async_trait]
impl CommandProcessor for ImageCommandProcessor {
    async fn process(
        &self,
        ctx: &ProcessingContext,
        command: &Command,
    ) -> Result<ProcessingResult, ProcessingFailure> {
        let start = Instant::now();
        let command_type = command.command_type();

        info!(
            command_id = %command.id,
            command_type = %command_type,
            image_url = %command.image_url,
            "Processing image command"
        );

        let outcome = self.execute(ctx, command).await;
        let elapsed = start.elapsed();

        let status = if outcome.is_ok() { "success" } else { "error" };
        self.metrics.observe_duration(command_type.label(), elapsed.as_secs_f64());
        self.metrics.record_processed(command_type.label(), status);

        match outcome {
            Ok(location) => {
                let result = ProcessingResult::succeeded(&command.id, location).with_elapsed(elapsed);
                info!(
                    command_id = %command.id,
                    output_location = %result.output_location,
                    duration_ms = result.processing_time_ms,
                    "Image processed successfully"
                );
                Ok(result)
            }
            Err(error) => {
                error!(
                    command_id = %command.id,
                    command_type = %command_type,
                    error = %error,
                    "Processing failed"
                );
                Err(ProcessingFailure::new(&command.id, error, elapsed))
            }
        }
    }
}

/// Validates and logs commands without touching the network or storage
#[derive(Default)]
pub struct DryRunProcessor {
    processed: Mutex<Vec<Command>>,
    metrics: Option<Arc<dyn ProcessingMetrics>>,
}

impl DryRunProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: Arc<dyn ProcessingMetrics>) -> Self {
        Self {
            processed: Mutex::new(Vec::new()),
            metrics: Some(metrics),
        }
    }

    pub fn processed_count(&self) -> usize {
        self.processed.lock().map(|p| p.len()).unwrap_or_default()
    }

    pub fn last_command(&self) -> Option<Command> {
        self.processed.lock().ok().and_then(|p| p.last().cloned())
    }

    pub fn processed_commands(&self) -> Vec<Command> {
        self.processed.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn observe(&self, command_type: CommandType, status: &str, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_duration(command_type.label(), elapsed.as_secs_f64());
            metrics.record_processed(command_type.label(), status);
        }
    }
}

#[async_trait]
impl CommandProcessor for DryRunProcessor {
    async fn process(
        &self,
        ctx: &ProcessingContext,
        command: &Command,
    ) -> Result<ProcessingResult, ProcessingFailure> {
        let start = Instant::now();
        let command_type = command.command_type();

        info!(
            command_id = %command.id,
            command_type = %command_type,
            image_url = %command.image_url,
            "Processing command (dry run)"
        );

        let checked = if ctx.is_cancelled() {
            Err(ProcessError::Cancelled)
        } else {
            validate(command)
        };
        if let Err(error) = checked {
            self.observe(command_type, "error", start.elapsed());
            warn!(command_id = %command.id, error = %error, "Command rejected");
            return Err(ProcessingFailure::new(&command.id, error, start.elapsed()));
        }

        match &command.operation {
            Operation::Resize(Some(p)) => {
                info!(width = p.width, height = p.height, "Would resize image")
            }
            Operation::Filter(Some(p)) => info!(
                filter_type = %p.filter_type,
                intensity = p.intensity,
                "Would apply filter"
            ),
            Operation::Transform(Some(p)) => {
                info!(rotation = p.rotation_degrees, "Would transform image")
            }
            Operation::Crop(Some(p)) => {
                info!(width = p.width, height = p.height, "Would crop image")
            }
            _ => info!(command_type = %command_type, "Command type"),
        }

        if let Ok(mut processed) = self.processed.lock() {
            processed.push(command.clone());
        }

        let elapsed = start.elapsed();
        self.observe(command_type, "success", elapsed);
        Ok(ProcessingResult::succeeded(&command.id, "").with_elapsed(elapsed))
    }
}
