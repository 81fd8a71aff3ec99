use super::decoder::{encode, MessageFormat};
use crate::models::Command;
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("failed to create Kafka producer: {0}")]
    Create(String),

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to deliver message: {0}")]
    Delivery(String),
}

/// Publishes commands onto the command topic
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send(&self, command: &Command) -> Result<(), ProducerError>;
}

/// Kafka producer keyed by command id
#[derive(Clone)]
pub struct KafkaCommandProducer {
    inner: Arc<FutureProducer>,
    topic: String,
    format: MessageFormat,
}

impl KafkaCommandProducer {
    pub fn new(brokers: &str, topic: &str, format: MessageFormat) -> Result<Self, ProducerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| ProducerError::Create(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(producer),
            topic: topic.to_string(),
            format,
        })
    }
}

#[async_trait]
impl CommandSender for KafkaCommandProducer {
    async fn send(&self, command: &Command) -> Result<(), ProducerError> {
        let payload = encode(command, self.format)?;

        let record = FutureRecord::to(&self.topic)
            .key(&command.id)
            .payload(&payload);

        let (partition, offset) = self
            .inner
            .send(record, Timeout::After(Duration::from_secs(10)))
            .await
            .map_err(|(err, _)| ProducerError::Delivery(err.to_string()))?;

        debug!(
            command_id = %command.id,
            format = %self.format,
            partition,
            offset,
            "Command published"
        );
        Ok(())
    }
}
