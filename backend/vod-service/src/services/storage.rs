//! Object storage presigner.
//!
//! The backend never touches object bodies; it only issues presigned PUT
//! URLs so clients upload straight to the bucket. The bucket notifies the
//! broker, and the uploads consumer takes it from there.
use crate::config::S3Config;
use aws_config::Region;
use aws_sdk_s3::presigning::{PresigningConfig, PresigningConfigError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid presign configuration: {0}")]
    Presign(#[from] PresigningConfigError),
    #[error("s3 request failed: {0}")]
    Request(String),
}

pub struct StoragePresigner {
    client: aws_sdk_s3::Client,
    bucket: String,
    expiry: Duration,
}

impl StoragePresigner {
    pub async fn new(cfg: &S3Config) -> Self {
        let mut loader = aws_config::from_env().region(Region::new(cfg.region.clone()));
        if let Some(endpoint) = &cfg.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        let conf = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(cfg.force_path_style)
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(conf),
            bucket: cfg.uploads_bucket.clone(),
            expiry: Duration::from_secs(cfg.presign_expiry_secs),
        }
    }

    /// Presign a PUT for `key` with the given content type.
    pub async fn presigned_put(&self, key: &str, content_type: &str) -> Result<String, StorageError> {
        let config = PresigningConfig::expires_in(self.expiry)?;
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(config)
            .await
            .map_err(|err| StorageError::Request(err.to_string()))?;
        Ok(request.uri().to_string())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn expiry_secs(&self) -> u64 {
        self.expiry.as_secs()
    }
}
