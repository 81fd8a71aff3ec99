/// Object storage for processed media
///
/// Provides a backend-agnostic `ObjectStorage` trait with S3/MinIO,
/// local filesystem and in-memory implementations.
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod config;
pub mod local;
pub mod memory;
pub mod s3;

pub use config::S3Config;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use s3::S3Storage;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("I/O error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Storage collaborator used by the image pipeline.
///
/// `upload` returns the backend-reported location of the stored object
/// (for example `s3://bucket/prefix/key` or an absolute file path).
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<String>;

    async fn download(&self, key: &str) -> StorageResult<Bytes>;

    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Reject keys that are empty or try to escape the storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.trim().is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".to_string()));
    }
    if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Join an optional prefix and a key with a single `/`.
pub fn prefixed_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix, key)
    }
}
