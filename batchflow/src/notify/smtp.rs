//! SMTP relay transport.
//!
//! The connection mode follows [`SmtpSettings`]: `use_ssl` connects over
//! implicit TLS, `use_tls` upgrades with STARTTLS, and neither speaks plain
//! SMTP. Credentials are sent whenever a user name is configured.

use super::{Notification, SmtpSettings, Transport};
use crate::errors::TransportError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::debug;

/// Connect and command timeout used unless overridden.
pub const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport that submits messages to the configured SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    name: String,
    timeout: Duration,
}

impl SmtpTransport {
    /// Creates an SMTP transport.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: DEFAULT_SMTP_TIMEOUT,
        }
    }

    /// Sets the connect and command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn mailer(
        &self,
        settings: &SmtpSettings,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let builder = if settings.use_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        } else if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        } else {
            Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(settings.host.as_str()))
        }
        .map_err(|e| self.map_error(&e))?;

        let mut builder = builder.port(settings.port).timeout(Some(self.timeout));
        if settings.has_credentials() {
            builder = builder.credentials(Credentials::new(
                settings.username.clone(),
                settings.secret.clone(),
            ));
        }
        Ok(builder.build())
    }

    fn message(&self, sender: &str, notification: &Notification) -> Result<Message, TransportError> {
        let from: Mailbox = sender
            .parse()
            .map_err(|e| self.transient(format!("invalid sender '{sender}': {e}")))?;
        let mut builder = Message::builder().from(from).subject(notification.subject());
        for recipient in notification.recipients() {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e| self.transient(format!("invalid recipient '{recipient}': {e}")))?;
            builder = builder.to(to);
        }
        builder
            .header(ContentType::TEXT_HTML)
            .body(notification.html_body().to_string())
            .map_err(|e| self.transient(format!("cannot build message: {e}")))
    }

    fn transient(&self, reason: impl Into<String>) -> TransportError {
        TransportError::transient(&self.name, reason)
    }

    fn map_error(&self, err: &lettre::transport::smtp::Error) -> TransportError {
        let code = err.status().and_then(|c| c.to_string().parse::<u16>().ok());
        if is_auth_rejection(code, err.is_permanent()) {
            TransportError::auth(&self.name, err.to_string())
        } else {
            self.transient(err.to_string())
        }
    }
}

/// Permanent `530`, `534`, `535` and `538` replies reject the login itself;
/// retrying with the same credentials cannot succeed.
pub(crate) fn is_auth_rejection(code: Option<u16>, permanent: bool) -> bool {
    permanent && matches!(code, Some(530 | 534 | 535 | 538))
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn submit(
        &self,
        settings: &SmtpSettings,
        sender: &str,
        notification: &Notification,
    ) -> Result<(), TransportError> {
        let message = self.message(sender, notification)?;
        let mailer = self.mailer(settings)?;

        let response = mailer.send(message).await.map_err(|e| self.map_error(&e))?;
        debug!(
            transport = %self.name,
            relay = %settings.relay(),
            security = settings.security(),
            code = %response.code(),
            "Message relayed"
        );
        Ok(())
    }
}
