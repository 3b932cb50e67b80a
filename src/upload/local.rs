//! Development backend: files on local disk, served by the app under `/uploads`.
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use super::{UploadBackend, UploadError};

pub struct LocalDiskBackend {
    root: PathBuf,
    public_prefix: String,
}

impl LocalDiskBackend {
    pub fn new(root: PathBuf, public_prefix: String) -> Self {
        Self {
            root,
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UploadBackend for LocalDiskBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<(), UploadError> {
        // Keys are generated by the pipeline, never taken from the client.
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                tracing::error!("Failed to create upload directory {}: {}", parent.display(), e);
                UploadError::Unavailable(e.to_string())
            })?;
        }
        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            tracing::error!("Failed to write upload file {}: {}", path.display(), e);
            UploadError::Unavailable(e.to_string())
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_prefix, key)
    }
}
