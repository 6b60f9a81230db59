//! Multi-channel delivery with per-channel retry.

use super::{Notification, SmtpSettings, Transport};
use crate::errors::{BatchflowError, NotificationDeliveryFailed, TransportError};
use crate::notify::is_valid_address;
use crate::pipeline::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default number of submissions per channel.
pub const DEFAULT_CHANNEL_ATTEMPTS: u32 = 3;

/// Default pause between submissions on the same channel.
pub const DEFAULT_CHANNEL_DELAY: Duration = Duration::from_secs(5);

/// A named transport with its own retry policy.
#[derive(Clone)]
pub struct Channel {
    name: String,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl Channel {
    /// Creates a channel with the default policy (3 attempts, 5 seconds apart).
    #[must_use]
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport,
            retry: RetryPolicy::fixed(DEFAULT_CHANNEL_ATTEMPTS, DEFAULT_CHANNEL_DELAY),
        }
    }

    /// Sets the number of attempts and the fixed delay between them.
    #[must_use]
    pub fn with_attempts(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.retry = RetryPolicy::fixed(max_attempts, delay);
        self
    }

    /// Returns the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the channel retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Outcome of a single submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The transport accepted the message.
    Delivered,
    /// Credentials were rejected; the channel was abandoned.
    Rejected {
        /// The transport's error.
        reason: String,
    },
    /// A transient failure.
    Failed {
        /// The transport's error.
        reason: String,
    },
}

/// One entry of the channel attempt log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAttempt {
    /// The channel name.
    pub channel: String,
    /// Attempt number on this channel (1-indexed).
    pub attempt: u32,
    /// What happened.
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl ChannelAttempt {
    fn delivered(channel: &str, attempt: u32) -> Self {
        Self {
            channel: channel.to_string(),
            attempt,
            outcome: AttemptOutcome::Delivered,
        }
    }

    fn failed(channel: &str, attempt: u32, err: &TransportError) -> Self {
        let outcome = match err {
            TransportError::Auth { .. } => AttemptOutcome::Rejected {
                reason: err.to_string(),
            },
            TransportError::Transient { .. } => AttemptOutcome::Failed {
                reason: err.to_string(),
            },
        };
        Self {
            channel: channel.to_string(),
            attempt,
            outcome,
        }
    }

    /// Returns true if this attempt delivered the message.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.outcome == AttemptOutcome::Delivered
    }
}

/// Proof of delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// The channel that accepted the message.
    pub channel: String,
    /// Every attempt made, including those on earlier channels.
    pub attempts: Vec<ChannelAttempt>,
}

/// Sends notifications through an ordered list of channels.
#[derive(Debug, Clone)]
pub struct Notifier {
    settings: SmtpSettings,
    sender: String,
}

impl Notifier {
    /// Creates a notifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidNotification` if the sender address is malformed.
    pub fn new(settings: SmtpSettings, sender: impl Into<String>) -> Result<Self, BatchflowError> {
        let sender = sender.into();
        if !is_valid_address(&sender) {
            return Err(BatchflowError::InvalidNotification(format!(
                "invalid sender address '{sender}'"
            )));
        }
        Ok(Self { settings, sender })
    }

    /// Returns the relay settings.
    #[must_use]
    pub fn settings(&self) -> &SmtpSettings {
        &self.settings
    }

    /// Returns the sender address.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Delivers `notification` through the first channel that accepts it.
    ///
    /// Channels are tried in order. Each gets up to its own number of attempts
    /// with a fixed delay in between; an authentication rejection abandons the
    /// channel immediately.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationDeliveryFailed`] with the full attempt log when
    /// every channel is exhausted.
    pub async fn send(
        &self,
        notification: &Notification,
        channels: &[Channel],
    ) -> Result<DeliveryReceipt, NotificationDeliveryFailed> {
        let mut attempts = Vec::new();

        for channel in channels {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match channel
                    .transport
                    .submit(&self.settings, &self.sender, notification)
                    .await
                {
                    Ok(()) => {
                        attempts.push(ChannelAttempt::delivered(&channel.name, attempt));
                        info!(
                            channel = %channel.name,
                            attempt,
                            recipients = notification.recipients().len(),
                            subject = %notification.subject(),
                            "Notification delivered"
                        );
                        return Ok(DeliveryReceipt {
                            channel: channel.name.clone(),
                            attempts,
                        });
                    }
                    Err(err) => {
                        attempts.push(ChannelAttempt::failed(&channel.name, attempt, &err));

                        if !err.is_transient() {
                            warn!(
                                channel = %channel.name,
                                attempt,
                                error = %err,
                                "Channel rejected credentials, moving to next channel"
                            );
                            break;
                        }

                        match channel.retry.delay_after(attempt) {
                            Some(delay) => {
                                debug!(
                                    channel = %channel.name,
                                    attempt,
                                    delay = ?delay,
                                    error = %err,
                                    "Retrying notification"
                                );
                                tokio::time::sleep(delay).await;
                            }
                            None => {
                                warn!(
                                    channel = %channel.name,
                                    attempts = attempt,
                                    error = %err,
                                    "Channel exhausted"
                                );
                                break;
                            }
                        }
                    }
                }
            }
        }

        error!(
            channels = channels.len(),
            attempts = attempts.len(),
            "Notification delivery failed on every channel"
        );
        Err(NotificationDeliveryFailed { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MockTransport;
    use pretty_assertions::assert_eq;

    fn notification() -> Notification {
        Notification::new(["admin@example.com"], "subject", "<p>hi</p>").unwrap()
    }

    fn notifier() -> Notifier {
        Notifier::new(SmtpSettings::default(), "batch@example.com").unwrap()
    }

    fn transient() -> TransportError {
        TransportError::transient("mock", "connection refused")
    }

    #[test]
    fn test_invalid_sender_rejected() {
        assert!(Notifier::new(SmtpSettings::default(), "not-an-address").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_exhausted_then_fallback() {
        let mut primary = MockTransport::new();
        primary.expect_submit().times(3).returning(|_, _, _| Err(transient()));
        let mut fallback = MockTransport::new();
        fallback.expect_submit().times(1).returning(|_, _, _| Ok(()));

        let channels = vec![
            Channel::new("primary", Arc::new(primary)),
            Channel::new("fallback", Arc::new(fallback)),
        ];

        let started = tokio::time::Instant::now();
        let receipt = notifier().send(&notification(), &channels).await.unwrap();

        assert_eq!(receipt.channel, "fallback");
        let log: Vec<(&str, u32, bool)> = receipt
            .attempts
            .iter()
            .map(|a| (a.channel.as_str(), a.attempt, a.is_delivered()))
            .collect();
        assert_eq!(
            log,
            vec![
                ("primary", 1, false),
                ("primary", 2, false),
                ("primary", 3, false),
                ("fallback", 1, true),
            ]
        );
        // Two 5 second pauses on the primary, none after its last attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_skips_to_next_channel() {
        let mut primary = MockTransport::new();
        primary
            .expect_submit()
            .times(1)
            .returning(|_, _, _| Err(TransportError::auth("mock", "535 bad credentials")));
        let mut fallback = MockTransport::new();
        fallback.expect_submit().times(1).returning(|_, _, _| Ok(()));

        let channels = vec![
            Channel::new("primary", Arc::new(primary)),
            Channel::new("fallback", Arc::new(fallback)),
        ];

        let receipt = notifier().send(&notification(), &channels).await.unwrap();
        assert_eq!(receipt.attempts.len(), 2);
        assert!(matches!(
            receipt.attempts[0].outcome,
            AttemptOutcome::Rejected { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_channels_exhausted() {
        let mut primary = MockTransport::new();
        primary.expect_submit().times(2).returning(|_, _, _| Err(transient()));
        let mut fallback = MockTransport::new();
        fallback.expect_submit().times(2).returning(|_, _, _| Err(transient()));

        let channels = vec![
            Channel::new("primary", Arc::new(primary)).with_attempts(2, Duration::from_secs(1)),
            Channel::new("fallback", Arc::new(fallback)).with_attempts(2, Duration::from_secs(1)),
        ];

        let err = notifier().send(&notification(), &channels).await.unwrap_err();
        assert_eq!(err.attempts.len(), 4);
        assert!(err.attempts.iter().all(|a| !a.is_delivered()));
    }

    #[tokio::test]
    async fn test_first_success_returns_immediately() {
        let mut primary = MockTransport::new();
        primary.expect_submit().times(1).returning(|_, _, _| Ok(()));
        let mut fallback = MockTransport::new();
        fallback.expect_submit().never();

        let channels = vec![
            Channel::new("primary", Arc::new(primary)),
            Channel::new("fallback", Arc::new(fallback)),
        ];

        let receipt = notifier().send(&notification(), &channels).await.unwrap();
        assert_eq!(receipt.channel, "primary");
        assert_eq!(receipt.attempts.len(), 1);
    }

    #[test]
    fn test_attempt_log_serialization() {
        let attempt = ChannelAttempt::failed("primary", 2, &transient());
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["channel"], "primary");
        assert_eq!(json["outcome"], "failed");
        assert!(json["reason"].as_str().unwrap().contains("connection refused"));
    }
}
