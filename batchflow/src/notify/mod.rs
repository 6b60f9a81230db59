//! Outbound notifications with multi-channel fallback.
//!
//! A [`Notifier`] holds the relay settings and sender address and delivers a
//! [`Notification`] through an ordered list of [`Channel`]s, primary first.
//! Each channel wraps a [`Transport`] and retries it with a fixed delay.
//! [`SmtpTransport`] talks to the relay; [`SpoolTransport`] drops messages
//! into a pickup directory.
//! The engine drives the notifier through a [`NotificationPlan`], which also
//! renders the message from the finished run.

mod message;
mod notifier;
mod plan;
mod render;
mod settings;
mod smtp;
mod spool;
mod transport;

pub use message::{is_valid_address, Notification};
pub use notifier::{
    AttemptOutcome, Channel, ChannelAttempt, DeliveryReceipt, Notifier, DEFAULT_CHANNEL_ATTEMPTS,
    DEFAULT_CHANNEL_DELAY,
};
pub use plan::{NotificationKind, NotificationOutcome, NotificationPlan};
pub use render::{
    escape_html, MessageRenderer, PlainRenderer, RenderedMessage, FAILURE_SUBJECT, SUCCESS_SUBJECT,
};
pub use settings::SmtpSettings;
pub use smtp::{SmtpTransport, DEFAULT_SMTP_TIMEOUT};
pub use spool::{format_message, SpoolTransport};
pub use transport::Transport;

#[cfg(test)]
pub use transport::MockTransport;
