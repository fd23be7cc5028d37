use crate::config::env::{self, EnvKey};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

const DEFAULT_QUEUE: &str = "image_resize";
const DEFAULT_FAILURE_LOG: &str = "storage/logs/image_resize.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub queue_name: String,
}

impl QueueConfig {
    /// Builds the `amqp://` URI, percent-encoding credentials and vhost.
    pub fn uri(&self) -> Result<String, ConfigError> {
        let mut url = Url::parse(&format!("amqp://{}:{}", self.host, self.port))
            .map_err(|e| ConfigError::Invalid(format!("AMQP host {:?}: {}", self.host, e)))?;
        url.set_username(&self.username)
            .map_err(|_| ConfigError::Invalid("AMQP username".to_string()))?;
        url.set_password(Some(&self.password))
            .map_err(|_| ConfigError::Invalid("AMQP password".to_string()))?;
        if self.vhost != "/" {
            url.path_segments_mut()
                .map_err(|_| ConfigError::Invalid("AMQP vhost".to_string()))?
                .push(&self.vhost);
        }
        Ok(url.to_string())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub bucket: String,
    pub endpoint: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MailConfig {
    /// Empty host puts the notifier in no-op mode.
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: Option<String>,
    pub alert_to: String,
    pub starttls: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub queue: QueueConfig,
    pub storage: StorageConfig,
    pub mail: MailConfig,
    pub failure_log_path: PathBuf,
    pub worker_concurrency: usize,
    pub jpeg_quality: u8,
}

fn required(key: EnvKey) -> Result<String, ConfigError> {
    let name = key.as_str();
    env::get(key).map_err(|_| ConfigError::Missing(name))
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let queue = QueueConfig {
            host: required(EnvKey::AmqpHost)?,
            port: env::get_parsed_strict(EnvKey::AmqpPort, 5672).map_err(ConfigError::Invalid)?,
            username: required(EnvKey::AmqpUsername)?,
            password: required(EnvKey::AmqpPassword)?,
            vhost: env::get_or(EnvKey::AmqpVhost, "/"),
            queue_name: env::get_or(EnvKey::ResizeQueue, DEFAULT_QUEUE),
        };

        let storage = StorageConfig {
            access_key: required(EnvKey::AwsKey)?,
            secret_key: required(EnvKey::AwsSecret)?,
            region: required(EnvKey::AwsRegion)?,
            bucket: required(EnvKey::AwsBucket)?,
            endpoint: env::get_opt(EnvKey::AwsEndpoint),
        };

        let host = env::get_or(EnvKey::MailHost, "");
        let (from_address, alert_to) = if host.trim().is_empty() {
            (
                env::get_or(EnvKey::MailFromAddress, ""),
                env::get_or(EnvKey::MailAlertTo, ""),
            )
        } else {
            (required(EnvKey::MailFromAddress)?, required(EnvKey::MailAlertTo)?)
        };
        let mail = MailConfig {
            host,
            port: env::get_parsed_strict(EnvKey::MailPort, 587).map_err(ConfigError::Invalid)?,
            username: env::get_opt(EnvKey::MailUsername),
            password: env::get_opt(EnvKey::MailPassword),
            from_address,
            from_name: env::get_opt(EnvKey::MailFromName),
            alert_to,
            starttls: env::get_parsed(EnvKey::MailStartTls, true),
        };

        let worker_concurrency: usize =
            env::get_parsed_strict(EnvKey::WorkerConcurrency, 8).map_err(ConfigError::Invalid)?;
        if worker_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "WORKER_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        let jpeg_quality: u8 =
            env::get_parsed_strict(EnvKey::JpegQuality, 95).map_err(ConfigError::Invalid)?;
        if !(1..=100).contains(&jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "JPEG_QUALITY must be within 1..=100, got {jpeg_quality}"
            )));
        }

        Ok(Self {
            queue,
            storage,
            mail,
            failure_log_path: PathBuf::from(env::get_or(EnvKey::FailureLogPath, DEFAULT_FAILURE_LOG)),
            worker_concurrency,
            jpeg_quality,
        })
    }
}
