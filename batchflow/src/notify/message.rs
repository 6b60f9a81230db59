//! Outbound notification messages.

use crate::errors::BatchflowError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static ADDRESS_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$").ok()
});

/// Returns true if `address` is a syntactically valid mailbox.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(address))
}

/// A rendered message addressed to a set of recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    recipients: Vec<String>,
    subject: String,
    html_body: String,
}

impl Notification {
    /// Creates a notification.
    ///
    /// Recipients are trimmed and de-duplicated, keeping first occurrence order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidNotification` if there are no recipients or an address
    /// is malformed.
    pub fn new<I, S>(
        recipients: I,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Result<Self, BatchflowError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for raw in recipients {
            let address = raw.as_ref().trim();
            if !is_valid_address(address) {
                return Err(BatchflowError::InvalidNotification(format!(
                    "invalid recipient address '{address}'"
                )));
            }
            if !unique.iter().any(|a| a == address) {
                unique.push(address.to_string());
            }
        }

        if unique.is_empty() {
            return Err(BatchflowError::InvalidNotification(
                "at least one recipient is required".to_string(),
            ));
        }

        Ok(Self {
            recipients: unique,
            subject: subject.into(),
            html_body: html_body.into(),
        })
    }

    /// Returns the recipients.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Returns the subject line.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the HTML body.
    #[must_use]
    pub fn html_body(&self) -> &str {
        &self.html_body
    }
}
