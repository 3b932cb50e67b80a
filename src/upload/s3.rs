//! Production backend: public-read objects in an S3 bucket.
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{timeout::TimeoutConfig, BehaviorVersion};
use aws_sdk_s3::{
    config::Region,
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::ObjectCannedAcl,
    Client,
};
use bytes::Bytes;

use super::{UploadBackend, UploadError};
use crate::config::S3Config;

pub struct S3Backend {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3Backend {
    /// Credentials come from the default AWS chain (env vars, profile, role).
    pub async fn new(config: &S3Config) -> Self {
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build();
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(timeouts)
            .load()
            .await;

        tracing::info!(bucket = %config.bucket, region = %config.region, "AWS S3 client initialized");

        Self {
            client: Client::new(&sdk_config),
            bucket: config.bucket.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UploadBackend for S3Backend {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), UploadError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    "S3 PUT failed - Bucket: {}, Key: {}, Size: {} bytes, Error: {}",
                    self.bucket,
                    key,
                    size,
                    DisplayErrorContext(&e)
                );
                UploadError::Unavailable(DisplayErrorContext(&e).to_string())
            })?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }
}
