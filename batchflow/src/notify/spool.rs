//! Pickup-directory transport.
//!
//! Each submission becomes one RFC 5322 message file in a spool directory,
//! from which the host mail system forwards it to the configured relay.
//! Files are written under a temporary name and renamed into place so a
//! pickup agent never sees a partial message.

use super::{Notification, SmtpSettings, Transport};
use crate::errors::TransportError;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Transport that writes messages into a pickup directory.
#[derive(Debug, Clone)]
pub struct SpoolTransport {
    name: String,
    dir: PathBuf,
}

impl SpoolTransport {
    /// Creates a spool transport writing into `dir`.
    #[must_use]
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    /// Returns the spool directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn transient(&self, reason: impl std::fmt::Display) -> TransportError {
        TransportError::transient(&self.name, reason.to_string())
    }
}

/// Formats `notification` as an RFC 5322 message.
#[must_use]
pub fn format_message(settings: &SmtpSettings, sender: &str, notification: &Notification) -> String {
    let mut message = String::new();
    message.push_str(&format!("From: {sender}\r\n"));
    message.push_str(&format!("To: {}\r\n", notification.recipients().join(", ")));
    message.push_str(&format!("Subject: {}\r\n", header_value(notification.subject())));
    message.push_str(&format!("Date: {}\r\n", Utc::now().to_rfc2822()));
    message.push_str(&format!("Message-ID: <{}@batchflow>\r\n", Uuid::new_v4()));
    message.push_str(&format!(
        "X-Batchflow-Relay: {} ({})\r\n",
        settings.relay(),
        settings.security()
    ));
    if settings.has_credentials() {
        message.push_str(&format!("X-Batchflow-Auth-User: {}\r\n", settings.username));
    }
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str("Content-Type: text/html; charset=utf-8\r\n");
    message.push_str("Content-Transfer-Encoding: 8bit\r\n");
    message.push_str("\r\n");
    message.push_str(notification.html_body());
    message.push_str("\r\n");
    message
}

fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[async_trait]
impl Transport for SpoolTransport {
    async fn submit(
        &self,
        settings: &SmtpSettings,
        sender: &str,
        notification: &Notification,
    ) -> Result<(), TransportError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.transient(format!("cannot create {}: {e}", self.dir.display())))?;

        let stem = format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"), Uuid::new_v4());
        let partial = self.dir.join(format!("{stem}.partial"));
        let target = self.dir.join(format!("{stem}.eml"));

        let body = format_message(settings, sender, notification);
        tokio::fs::write(&partial, body.as_bytes())
            .await
            .map_err(|e| self.transient(format!("cannot write {}: {e}", partial.display())))?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| self.transient(format!("cannot publish {}: {e}", target.display())))?;

        debug!(
            transport = %self.name,
            path = %target.display(),
            recipients = notification.recipients().len(),
            "Message spooled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> Notification {
        Notification::new(
            ["admin@example.com", "data@example.com"],
            "Batch data processing failed",
            "<p>read_data failed</p>",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_writes_message_file() {
        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolTransport::new("spool", dir.path().join("outbox"));

        spool
            .submit(&SmtpSettings::default(), "batch@example.com", &notification())
            .await
            .unwrap();

        let files: Vec<_> = std::fs::read_dir(spool.dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].extension().unwrap(), "eml");

        let content = std::fs::read_to_string(&files[0]).unwrap();
        assert!(content.contains("From: batch@example.com\r\n"));
        assert!(content.contains("To: admin@example.com, data@example.com\r\n"));
        assert!(content.contains("Subject: Batch data processing failed\r\n"));
        assert!(content.contains("Content-Type: text/html; charset=utf-8"));
        assert!(content.ends_with("<p>read_data failed</p>\r\n"));
    }

    #[tokio::test]
    async fn test_credentials_do_not_block_spooling() {
        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolTransport::new("spool", dir.path());
        let settings = SmtpSettings::default().with_credentials("bot", "");

        spool
            .submit(&settings, "batch@example.com", &notification())
            .await
            .unwrap();

        let file = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("X-Batchflow-Auth-User: bot\r\n"));
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let spool = SpoolTransport::new("spool", blocker.join("outbox"));

        let err = spool
            .submit(&SmtpSettings::default(), "batch@example.com", &notification())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_header_injection_is_flattened() {
        assert_eq!(header_value("a\r\nBcc: x"), "a  Bcc: x");
    }
}
