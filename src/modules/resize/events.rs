use serde::{Deserialize, Serialize};
use tracing::warn;

/// One queue message: a source image and the renditions requested from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeJob {
    #[serde(rename = "src", default)]
    pub source: String,
    #[serde(rename = "dst", default)]
    pub destination_prefix: String,
    #[serde(default)]
    pub sizes: Vec<String>,
}

impl ResizeJob {
    /// Decodes a delivery body. A malformed body yields an empty job, which
    /// dispatches nothing; the parse error is only logged.
    pub fn decode(payload: &[u8]) -> Self {
        match serde_json::from_slice::<ResizeJob>(payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(
                    error = %e,
                    bytes = payload.len(),
                    "Malformed resize message; dropping without work"
                );
                Self::default()
            }
        }
    }

    /// `<dst><size>.jpg`
    pub fn rendition_path(&self, size: &str) -> String {
        format!("{}{}.jpg", self.destination_prefix, size)
    }
}
