use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("refusing to render {0} at zero width")]
    InvalidWidth(String),

    #[error("failed to load original image {path}: {reason}")]
    SourceUnreadable { path: String, reason: String },

    #[error("failed to save resized image {path}: {reason} ({identity})")]
    DestUnwritable {
        path: String,
        reason: String,
        identity: String,
    },

    #[error("render task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no /media/ segment in {0}")]
    KeyDerivationFailed(String),

    #[error("failed to read {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("put-object for {key} rejected: {reason}")]
    UploadRejected { key: String, reason: String },
}
