//! The transport seam between the notifier and the outside world.

use super::{Notification, SmtpSettings};
use crate::errors::TransportError;
use async_trait::async_trait;

/// Submits rendered notifications to an external delivery system.
///
/// Implementations report credential rejection as [`TransportError::Auth`]
/// and every other failure as [`TransportError::Transient`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submits one message.
    async fn submit(
        &self,
        settings: &SmtpSettings,
        sender: &str,
        notification: &Notification,
    ) -> Result<(), TransportError>;
}
