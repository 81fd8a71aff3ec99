//! Kafka integration: wire schema, decoding, the consume loop and the producer

pub mod consumer;
pub mod decoder;
pub mod producer;
pub mod proto;
pub mod source;

pub use consumer::{
    transition, CommandConsumer, ConsumerError, ConsumerEvent, ConsumerState, ConsumerStats,
    MessageOutcome,
};
pub use decoder::{encode, DecodeError, FormatError, MessageDecoder, MessageFormat};
pub use producer::{CommandSender, KafkaCommandProducer, ProducerError};
pub use source::{KafkaMessageSource, KafkaSourceConfig, MessageSource, SourceError, SourceMessage};
