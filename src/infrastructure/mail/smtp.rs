use super::{Notifier, NotifyError};
use crate::config::settings::{ConfigError, MailConfig};
use async_trait::async_trait;
use lettre::message::{Mailbox, Message, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};

/// SMTP alert sender. Without a configured host it only logs.
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Option<Mailbox>,
    to: Option<Mailbox>,
}

impl SmtpNotifier {
    /// Builds the transport once at startup; any error here is a configuration error.
    pub fn new(config: &MailConfig) -> Result<Self, ConfigError> {
        if config.host.trim().is_empty() {
            warn!("MAIL_HOST not configured; failure alerts will only be logged");
            return Ok(Self {
                transport: None,
                from: None,
                to: None,
            });
        }

        let from_address = config.from_address.parse::<Address>().map_err(|e| {
            ConfigError::Invalid(format!("MAIL_FROM_ADDRESS {:?}: {}", config.from_address, e))
        })?;
        let from = Mailbox::new(config.from_name.clone(), from_address);
        let to = config.alert_to.parse::<Mailbox>().map_err(|e| {
            ConfigError::Invalid(format!("MAIL_ALERT_TO {:?}: {}", config.alert_to, e))
        })?;

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        }
        .map_err(|e| ConfigError::Invalid(format!("SMTP transport for {}: {}", config.host, e)))?
        .port(config.port);

        let builder = if let (Some(username), Some(password)) = (&config.username, &config.password)
        {
            builder.credentials(Credentials::new(username.to_string(), password.to_string()))
        } else {
            builder
        };

        info!(host = %config.host, port = config.port, "✅ SMTP notifier configured");

        Ok(Self {
            transport: Some(Arc::new(builder.build())),
            from: Some(from),
            to: Some(to),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

fn html_body(message: &str) -> String {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!("<div style='background-color: aqua;'>{escaped}</div>")
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, subject: &str, message: &str) -> Result<(), NotifyError> {
        let (Some(transport), Some(from), Some(to)) = (&self.transport, &self.from, &self.to) else {
            info!(subject, alert = message, "SMTP disabled; alert not sent");
            return Ok(());
        };

        let email = Message::builder()
            .from(from.clone())
            .to(to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_HTML)
            .body(html_body(message))
            .map_err(|e| NotifyError::Build(e.to_string()))?;

        transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        Ok(())
    }
}
