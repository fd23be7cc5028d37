use crate::infrastructure::mail::Notifier;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

pub const ALERT_SUBJECT: &str = "image resize error";

/// Persistent, line-oriented failure log.
pub trait FailureSink: Send + Sync {
    fn append(&self, line: &str) -> std::io::Result<()>;
}

/// Append-only file, reopened for every line so rotation of the path is
/// picked up.
pub struct FileFailureLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileFailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

impl FailureSink for FileFailureLog {
    fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| std::io::Error::other("failure log lock poisoned"))?;
        let mut file = self.open()?;
        file.write_all(format!("{line}\n").as_bytes())
    }
}

/// Routes every per-task failure to the failure log and the alert channel.
/// Never fails and never panics.
#[derive(Clone)]
pub struct FailureReporter {
    sink: Arc<dyn FailureSink>,
    notifier: Arc<dyn Notifier>,
}

impl FailureReporter {
    pub fn new(sink: Arc<dyn FailureSink>, notifier: Arc<dyn Notifier>) -> Self {
        Self { sink, notifier }
    }

    pub async fn report(&self, err: &(dyn std::error::Error + Send + Sync), context: &str) {
        let message = format!("{context}: {err}");
        error!(error = %err, context, "❌ {}", message);

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string());
        if let Err(e) = self.sink.append(&format!("{timestamp} {message}")) {
            error!(error = %e, "Failed to write failure log");
        }

        if let Err(e) = self.notifier.notify(ALERT_SUBJECT, &message).await {
            error!(error = %e, "Failed to send failure alert");
        }
    }
}
