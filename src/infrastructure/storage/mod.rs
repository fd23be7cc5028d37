pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3(#[from] aws_sdk_s3::Error),

    #[cfg(test)]
    #[error("{0}")]
    Other(String),
}

/// A single put-object call. The object is always written public-read.
#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    pub key: String,
    pub content_type: String,
    pub body: Bytes,
}

impl PutObjectRequest {
    pub fn content_length(&self) -> i64 {
        self.body.len() as i64
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes the object and returns a printable rendition of the raw response.
    async fn put_object(&self, request: PutObjectRequest) -> Result<String, StorageError>;
}
