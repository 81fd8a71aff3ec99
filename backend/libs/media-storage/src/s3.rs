/// S3/MinIO backend for object storage
use crate::config::S3Config;
use crate::{prefixed_key, validate_key, ObjectStorage, StorageError, StorageResult};
use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct S3Storage {
    client: Arc<Client>,
    config: S3Config,
}

impl S3Storage {
    /// Build an S3 client from explicit configuration.
    ///
    /// Static credentials are used when both keys are present, otherwise the
    /// default AWS credential chain applies.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "image_worker_s3",
            );
            loader = loader.credentials_provider(credentials);
        }

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.path_style)
            .build();

        info!(
            bucket = %config.bucket,
            prefix = %config.prefix,
            endpoint = ?config.endpoint,
            "S3 storage initialized"
        );

        Ok(Self {
            client: Arc::new(Client::from_conf(s3_config)),
            config,
        })
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// Health check for S3 connectivity
    pub async fn health_check(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("head_bucket failed: {e}")))?;

        Ok(())
    }

    fn full_key(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(prefixed_key(&self.config.prefix, key))
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<String> {
        let full_key = self.full_key(key)?;
        let size = body.len();

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .content_type(content_type)
            .content_length(size as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("failed to put object {full_key}: {e}")))?;

        let location = self.config.object_location(&full_key);
        debug!(key = %full_key, location = %location, size_bytes = size, "Uploaded object to S3");
        Ok(location)
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        let full_key = self.full_key(key)?;

        let response = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    StorageError::NotFound(full_key.clone())
                } else {
                    StorageError::Backend(format!("failed to get object {full_key}: {e}"))
                }
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("failed to read object {full_key}: {e}")))?;

        debug!(key = %full_key, "Downloaded object from S3");
        Ok(body.into_bytes())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let full_key = self.full_key(key)?;

        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                StorageError::Backend(format!("failed to delete object {full_key}: {e}"))
            })?;

        debug!(key = %full_key, "Deleted object from S3");
        Ok(())
    }
}
