use crate::common::reporter::{FailureReporter, FileFailureLog};
use crate::config::settings::{AppConfig, ConfigError};
use crate::infrastructure::mail::smtp::SmtpNotifier;
use crate::infrastructure::storage::s3::StorageService;
use crate::modules::resize::dispatcher::JobDispatcher;
use crate::modules::resize::renderer::ImageRenderer;
use crate::modules::resize::uploader::StorageUploader;
use crate::state::AppState;
use std::sync::Arc;
use tracing::info;

/// Wires the pipeline. Fails only on configuration problems.
pub fn create_app(config: AppConfig) -> Result<AppState, ConfigError> {
    let storage = StorageService::new(&config.storage);
    let notifier = SmtpNotifier::new(&config.mail)?;
    let failure_log = FileFailureLog::new(&config.failure_log_path);
    info!(
        path = %failure_log.path().display(),
        alerts = notifier.is_enabled(),
        "Failure reporting configured"
    );

    let reporter = FailureReporter::new(Arc::new(failure_log), Arc::new(notifier));
    let dispatcher = JobDispatcher::new(
        Arc::new(ImageRenderer::new(config.jpeg_quality)),
        StorageUploader::new(Arc::new(storage)),
        reporter,
        config.worker_concurrency,
    );

    Ok(AppState::new(config, dispatcher))
}
