//! Message sources for the consume loop
//!
//! [`MessageSource`] is the seam between the loop and the broker. The Kafka
//! implementation disables auto-commit and commits each offset explicitly.

use crate::metrics;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Recoverable; the loop logs and keeps going
    #[error("transient source error: {0}")]
    Transient(String),

    /// Broker-level failure that ends the loop
    #[error("fatal source error: {0}")]
    Fatal(String),
}

impl SourceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Fatal(_))
    }
}

impl From<KafkaError> for SourceError {
    fn from(err: KafkaError) -> Self {
        let fatal = matches!(
            err,
            KafkaError::ClientCreation(_) | KafkaError::Subscription(_)
        ) || matches!(
            err.rdkafka_error_code(),
            Some(
                RDKafkaErrorCode::Fatal
                    | RDKafkaErrorCode::Authentication
                    | RDKafkaErrorCode::SaslAuthenticationFailed
                    | RDKafkaErrorCode::TopicAuthorizationFailed
                    | RDKafkaErrorCode::GroupAuthorizationFailed
            )
        );

        if fatal {
            SourceError::Fatal(err.to_string())
        } else {
            SourceError::Transient(err.to_string())
        }
    }
}

/// A fetched record, detached from the client that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl SourceMessage {
    pub fn key_str(&self) -> &str {
        self.key
            .as_deref()
            .and_then(|k| std::str::from_utf8(k).ok())
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message. Must be safe to drop mid-await.
    async fn fetch(&mut self) -> Result<SourceMessage, SourceError>;

    async fn commit(&mut self, message: &SourceMessage) -> Result<(), SourceError>;

    async fn close(&mut self) -> Result<(), SourceError>;
}

#[derive(Debug, Clone)]
pub struct KafkaSourceConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

pub struct KafkaMessageSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaMessageSource {
    pub fn new(config: &KafkaSourceConfig) -> Result<Self, SourceError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .set("fetch.min.bytes", "10000")
            .set("fetch.wait.max.ms", "1000")
            .create()?;

        consumer.subscribe(&[config.topic.as_str()])?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Kafka consumer initialized"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn fetch(&mut self) -> Result<SourceMessage, SourceError> {
        let message = self.consumer.recv().await?;

        // Cached watermarks; no broker round trip
        if let Ok((_, high)) = self
            .consumer
            .get_watermark_offsets(message.topic(), message.partition())
        {
            metrics::set_consumer_lag(message.topic(), message.partition(), message.offset(), high);
        }

        Ok(SourceMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn commit(&mut self, message: &SourceMessage) -> Result<(), SourceError> {
        // Kafka stores the next offset to read
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )?;
        self.consumer.commit(&offsets, CommitMode::Async)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        info!(topic = %self.topic, "Closing Kafka connection");
        self.consumer.unsubscribe();
        Ok(())
    }
}
