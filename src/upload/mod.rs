/*!
 * Uploads
 * Validates an attached image, writes it to the configured backend under a
 * generated key and hands back its public URL.
 */
pub mod local;
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use thiserror::Error;

use crate::config::{UploadConfig, UploadTarget};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File too large. Maximum size is {} MB", .max_bytes / (1024 * 1024))]
    TooLarge { max_bytes: usize },

    #[error("Uploaded file is empty")]
    Empty,

    #[error("Unsupported file type ({0}). Allowed: JPEG, PNG, WebP, GIF")]
    UnsupportedType(String),

    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

/// Where uploaded bytes end up.
#[async_trait]
pub trait UploadBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), UploadError>;

    fn public_url(&self, key: &str) -> String;
}

pub struct UploadPipeline {
    backend: Arc<dyn UploadBackend>,
    max_bytes: usize,
}

impl UploadPipeline {
    pub fn new(backend: Arc<dyn UploadBackend>, max_bytes: usize) -> Self {
        Self { backend, max_bytes }
    }

    /// Build the backend selected in configuration. Done once at startup.
    pub async fn from_config(config: &UploadConfig) -> Self {
        let backend: Arc<dyn UploadBackend> = match &config.target {
            UploadTarget::LocalDisk { root, .. } => Arc::new(local::LocalDiskBackend::new(
                root.clone(),
                config.public_url_prefix(),
            )),
            UploadTarget::S3(s3_config) => Arc::new(s3::S3Backend::new(s3_config).await),
        };
        tracing::info!(backend = backend.name(), max_bytes = config.max_bytes, "Upload pipeline ready");
        Self::new(backend, config.max_bytes)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Store one image under `folder` and return its public URL.
    ///
    /// The caller's filename only contributes its extension, and only when
    /// it agrees with the sniffed content type.
    pub async fn store(
        &self,
        folder: &str,
        bytes: Bytes,
        original_filename: Option<&str>,
        declared_type: Option<&str>,
    ) -> Result<String, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                max_bytes: self.max_bytes,
            });
        }

        let content_type = sniff_image_type(&bytes).ok_or_else(|| {
            UploadError::UnsupportedType(declared_type.unwrap_or("unknown").to_string())
        })?;
        if let Some(declared) = declared_type {
            if !declared.eq_ignore_ascii_case(content_type) {
                tracing::debug!(declared, detected = content_type, "Declared content type overridden");
            }
        }

        let key = object_key(folder, original_filename, content_type);
        self.backend.put(&key, bytes.clone(), content_type).await?;

        let url = self.backend.public_url(&key);
        tracing::info!(key = %key, size = bytes.len(), backend = self.backend.name(), "Image uploaded");
        Ok(url)
    }
}

/// Image type from the file's leading bytes.
fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: RIFF .... WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn extensions_for(content_type: &str) -> &'static [&'static str] {
    match content_type {
        "image/jpeg" => &["jpg", "jpeg"],
        "image/png" => &["png"],
        "image/gif" => &["gif"],
        "image/webp" => &["webp"],
        _ => &["bin"],
    }
}

fn extension(original_filename: Option<&str>, content_type: &str) -> String {
    let allowed = extensions_for(content_type);
    original_filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| allowed.contains(&ext.as_str()))
        .unwrap_or_else(|| allowed[0].to_string())
}

/// `{folder}/{unix_millis}-{random}.{ext}`
pub fn object_key(folder: &str, original_filename: Option<&str>, content_type: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::rng().random_range(0..1_000_000_000);
    format!(
        "{}/{}-{}.{}",
        folder.trim_matches('/'),
        millis,
        suffix,
        extension(original_filename, content_type)
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Smallest PNG header the sniffer accepts.
    pub(crate) const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    #[derive(Default)]
    struct RecordingBackend {
        puts: Mutex<Vec<(String, usize, String)>>,
    }

    #[async_trait]
    impl UploadBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), UploadError> {
            self.puts
                .lock()
                .unwrap()
                .push((key.to_string(), bytes.len(), content_type.to_string()));
            Ok(())
        }

        fn public_url(&self, key: &str) -> String {
            format!("https://bucket.example/{}", key)
        }
    }

    struct DownBackend;

    #[async_trait]
    impl UploadBackend for DownBackend {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn put(&self, _: &str, _: Bytes, _: &str) -> Result<(), UploadError> {
            Err(UploadError::Unavailable("connection refused".into()))
        }

        fn public_url(&self, key: &str) -> String {
            key.to_string()
        }
    }

    #[tokio::test]
    async fn stores_under_generated_key() {
        let backend = Arc::new(RecordingBackend::default());
        let pipeline = UploadPipeline::new(backend.clone(), 1024);

        let url = pipeline
            .store("products", Bytes::from_static(PNG), Some("../../etc/passwd.png"), Some("image/png"))
            .await
            .unwrap();

        assert!(url.starts_with("https://bucket.example/products/"));
        assert!(url.ends_with(".png"));
        assert!(!url.contains(".."));
        let puts = backend.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].2, "image/png");
    }

    #[tokio::test]
    async fn rejects_empty_oversized_and_non_images() {
        let pipeline = UploadPipeline::new(Arc::new(RecordingBackend::default()), 8);

        assert!(matches!(
            pipeline.store("gallery", Bytes::new(), None, None).await,
            Err(UploadError::Empty)
        ));
        assert!(matches!(
            pipeline.store("gallery", Bytes::from_static(PNG), None, None).await,
            Err(UploadError::TooLarge { max_bytes: 8 })
        ));
        assert!(matches!(
            pipeline
                .store("gallery", Bytes::from_static(b"%PDF"), Some("a.pdf"), Some("application/pdf"))
                .await,
            Err(UploadError::UnsupportedType(t)) if t == "application/pdf"
        ));
    }

    #[tokio::test]
    async fn backend_failure_surfaces() {
        let pipeline = UploadPipeline::new(Arc::new(DownBackend), 1024);
        let result = pipeline.store("blog", Bytes::from_static(PNG), None, None).await;
        assert!(matches!(result, Err(UploadError::Unavailable(_))));
    }

    #[test]
    fn key_shape() {
        let key = object_key("gallery", Some("Photo.JPEG"), "image/jpeg");
        let (folder, file) = key.split_once('/').unwrap();
        assert_eq!(folder, "gallery");
        let (stem, ext) = file.rsplit_once('.').unwrap();
        assert_eq!(ext, "jpeg");
        let (millis, suffix) = stem.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert!(suffix.parse::<u32>().unwrap() < 1_000_000_000);
    }

    #[test]
    fn extension_must_match_content() {
        assert_eq!(extension(Some("evil.exe"), "image/png"), "png");
        assert_eq!(extension(Some("noext"), "image/gif"), "gif");
        assert_eq!(extension(None, "image/jpeg"), "jpg");
        assert_eq!(extension(Some("pic.WebP"), "image/webp"), "webp");
    }

    #[test]
    fn sniffing() {
        assert_eq!(sniff_image_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_image_type(b"GIF89a"), Some("image/gif"));
        assert_eq!(sniff_image_type(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image_type(b"<svg"), None);
    }
}
