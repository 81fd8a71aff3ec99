/// S3 configuration for processed image storage
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Custom endpoint for S3-compatible storage (MinIO)
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Key prefix applied to every object
    pub prefix: String,
    /// Whether to use path-style URLs (required for MinIO)
    pub path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "images".to_string(),
            region: "us-east-1".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            access_key_id: None,
            secret_access_key: None,
            prefix: "processed".to_string(),
            path_style: true,
        }
    }
}

impl S3Config {
    /// Location reported for a stored object (`s3://bucket/prefix/key`)
    pub fn object_location(&self, full_key: &str) -> String {
        format!("s3://{}/{}", self.bucket, full_key)
    }
}
