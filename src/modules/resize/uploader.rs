use super::error::UploadError;
use crate::infrastructure::storage::{ObjectStore, PutObjectRequest};
use bytes::Bytes;
use std::sync::Arc;
use tracing::info;

const KEY_MARKER: &str = "/media/";

/// What was written for one rendition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub key: String,
    pub content_type: String,
    pub content_length: usize,
}

/// Suffix of `local_path` from its first `/media/` segment.
pub fn derive_storage_key(local_path: &str) -> Result<&str, UploadError> {
    local_path
        .find(KEY_MARKER)
        .map(|idx| &local_path[idx..])
        .ok_or_else(|| UploadError::KeyDerivationFailed(local_path.to_string()))
}

/// Content type from the leading bytes; the file name is never consulted.
pub fn sniff_content_type(data: &[u8]) -> String {
    image::guess_format(data)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| mime::APPLICATION_OCTET_STREAM.to_string())
}

#[derive(Clone)]
pub struct StorageUploader {
    store: Arc<dyn ObjectStore>,
}

impl StorageUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn upload(&self, local_path: &str) -> Result<UploadReceipt, UploadError> {
        let key = derive_storage_key(local_path)?.to_string();

        let data = tokio::fs::read(local_path)
            .await
            .map_err(|source| UploadError::ReadFailed {
                path: local_path.to_string(),
                source,
            })?;

        let content_type = sniff_content_type(&data);
        let content_length = data.len();

        let request = PutObjectRequest {
            key: key.clone(),
            content_type: content_type.clone(),
            body: Bytes::from(data),
        };

        let response = self
            .store
            .put_object(request)
            .await
            .map_err(|e| UploadError::UploadRejected {
                key: key.clone(),
                reason: e.to_string(),
            })?;

        info!(%key, %content_type, content_length, %response, "⬆️ Uploaded rendition");

        Ok(UploadReceipt {
            key,
            content_type,
            content_length,
        })
    }
}
