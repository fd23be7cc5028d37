use std::env;
use std::str::FromStr;

pub enum EnvKey {
    AmqpHost,
    AmqpPort,
    AmqpUsername,
    AmqpPassword,
    AmqpVhost,
    ResizeQueue,
    AwsKey,
    AwsSecret,
    AwsRegion,
    AwsBucket,
    AwsEndpoint,
    MailHost,
    MailPort,
    MailUsername,
    MailPassword,
    MailFromAddress,
    MailFromName,
    MailAlertTo,
    MailStartTls,
    FailureLogPath,
    WorkerConcurrency,
    JpegQuality,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::AmqpHost => "AMQP_HOST",
            EnvKey::AmqpPort => "AMQP_PORT",
            EnvKey::AmqpUsername => "AMQP_USERNAME",
            EnvKey::AmqpPassword => "AMQP_PASSWORD",
            EnvKey::AmqpVhost => "AMQP_VHOST",
            EnvKey::ResizeQueue => "RESIZE_QUEUE",
            EnvKey::AwsKey => "AWS_KEY",
            EnvKey::AwsSecret => "AWS_SECRET",
            EnvKey::AwsRegion => "AWS_REGION",
            EnvKey::AwsBucket => "AWS_BUCKET",
            EnvKey::AwsEndpoint => "AWS_ENDPOINT",
            EnvKey::MailHost => "MAIL_HOST",
            EnvKey::MailPort => "MAIL_PORT",
            EnvKey::MailUsername => "MAIL_USERNAME",
            EnvKey::MailPassword => "MAIL_PASSWORD",
            EnvKey::MailFromAddress => "MAIL_FROM_ADDRESS",
            EnvKey::MailFromName => "MAIL_FROM_NAME",
            EnvKey::MailAlertTo => "MAIL_ALERT_TO",
            EnvKey::MailStartTls => "MAIL_STARTTLS",
            EnvKey::FailureLogPath => "FAILURE_LOG_PATH",
            EnvKey::WorkerConcurrency => "WORKER_CONCURRENCY",
            EnvKey::JpegQuality => "JPEG_QUALITY",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Like [`get_parsed`], but a value that is present and malformed is an error
/// instead of silently falling back.
pub fn get_parsed_strict<T: FromStr>(key: EnvKey, default: T) -> Result<T, String> {
    let name = key.as_str();
    match get(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{name}={val:?} is not valid")),
        Err(_) => Ok(default),
    }
}
