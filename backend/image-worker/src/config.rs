//! Worker configuration
//!
//! Loaded from environment variables (and an optional `.env` file). Every
//! setting has a default suitable for a local MinIO + Kafka setup.

use crate::kafka::MessageFormat;
use media_storage::S3Config;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorMode {
    /// Validate and log only
    Stub,
    /// Download, process and store
    Real,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_kafka_brokers")]
    pub kafka_brokers: String,
    #[serde(default = "default_kafka_topic")]
    pub kafka_topic: String,
    #[serde(default = "default_kafka_group_id")]
    pub kafka_group_id: String,
    #[serde(default = "default_message_format")]
    pub message_format: MessageFormat,

    #[serde(default = "default_processor_mode")]
    pub processor_mode: ProcessorMode,
    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageBackend,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_http_host")]
    pub http_host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    #[serde(default = "default_s3_endpoint")]
    pub s3_endpoint: String,
    #[serde(default = "default_s3_region")]
    pub s3_region: String,
    #[serde(default = "default_s3_credential")]
    pub s3_access_key: String,
    #[serde(default = "default_s3_credential")]
    pub s3_secret_key: String,
    #[serde(default = "default_s3_bucket")]
    pub s3_bucket: String,
    #[serde(default = "default_s3_prefix")]
    pub s3_prefix: String,

    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
    /// Per-message processing budget; 0 disables the deadline
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_kafka_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_kafka_topic() -> String {
    "image-commands".to_string()
}

fn default_kafka_group_id() -> String {
    "image-processor-group".to_string()
}

fn default_message_format() -> MessageFormat {
    MessageFormat::Json
}

fn default_processor_mode() -> ProcessorMode {
    ProcessorMode::Stub
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::S3
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/tmp/processed-images")
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_s3_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_s3_credential() -> String {
    "minioadmin".to_string()
}

fn default_s3_bucket() -> String {
    "images".to_string()
}

fn default_s3_prefix() -> String {
    "processed".to_string()
}

fn default_download_timeout_secs() -> u64 {
    30
}

fn default_max_download_bytes() -> u64 {
    crate::services::fetcher::DEFAULT_MAX_DOWNLOAD_BYTES
}

fn default_processing_timeout_secs() -> u64 {
    120
}

fn default_send_timeout_secs() -> u64 {
    5
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Config = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Config = envy::from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.brokers().is_empty() {
            return Err(ConfigError::Invalid("KAFKA_BROKERS must not be empty".into()));
        }
        if self.kafka_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("KAFKA_TOPIC must not be empty".into()));
        }
        if self.max_download_bytes == 0 {
            return Err(ConfigError::Invalid(
                "MAX_DOWNLOAD_BYTES must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Broker list normalized for librdkafka (`host:port,host:port`)
    pub fn brokers(&self) -> String {
        self.kafka_brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn http_bind_address(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn s3(&self) -> S3Config {
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        S3Config {
            bucket: self.s3_bucket.clone(),
            region: self.s3_region.clone(),
            endpoint: non_empty(&self.s3_endpoint),
            access_key_id: non_empty(&self.s3_access_key),
            secret_access_key: non_empty(&self.s3_secret_key),
            prefix: self.s3_prefix.clone(),
            path_style: true,
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn processing_timeout(&self) -> Option<Duration> {
        (self.processing_timeout_secs > 0).then(|| Duration::from_secs(self.processing_timeout_secs))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(Vec::new()).unwrap();

        assert_eq!(config.kafka_topic, "image-commands");
        assert_eq!(config.kafka_group_id, "image-processor-group");
        assert_eq!(config.message_format, MessageFormat::Json);
        assert_eq!(config.processor_mode, ProcessorMode::Stub);
        assert_eq!(config.http_bind_address(), "0.0.0.0:8080");
        assert_eq!(config.send_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_download_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(vars(&[
            ("KAFKA_BROKERS", "k1:9092, k2:9092,"),
            ("MESSAGE_FORMAT", "protobuf"),
            ("PROCESSOR_MODE", "real"),
            ("STORAGE_BACKEND", "local"),
            ("HTTP_PORT", "9090"),
            ("PROCESSING_TIMEOUT_SECS", "0"),
            ("S3_ENDPOINT", ""),
        ]))
        .unwrap();

        assert_eq!(config.brokers(), "k1:9092,k2:9092");
        assert_eq!(config.message_format, MessageFormat::Protobuf);
        assert_eq!(config.processor_mode, ProcessorMode::Real);
        assert_eq!(config.storage_backend, StorageBackend::Local);
        assert_eq!(config.http_port, 9090);
        assert_eq!(config.processing_timeout(), None);
        assert_eq!(config.s3().endpoint, None);
    }

    #[test]
    fn test_rejects_empty_brokers() {
        let result = Config::from_vars(vars(&[("KAFKA_BROKERS", " , ")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let result = Config::from_vars(vars(&[("PROCESSOR_MODE", "turbo")]));
        assert!(matches!(result, Err(ConfigError::Env(_))));
    }
}
