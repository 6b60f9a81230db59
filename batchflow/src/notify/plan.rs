//! What the engine sends when a run finishes, and what came of it.

use super::{Channel, ChannelAttempt, MessageRenderer, Notification, Notifier, PlainRenderer};
use crate::context::ResultStore;
use crate::core::{Run, RunStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Which of the two notifications a run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The run succeeded.
    Success,
    /// The run failed.
    Failure,
}

impl NotificationKind {
    /// Returns the kind matching a terminal run status.
    #[must_use]
    pub fn for_status(status: RunStatus) -> Self {
        if status == RunStatus::Succeeded {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

/// Result of the end-of-run notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// No notification plan was configured.
    NotConfigured,
    /// A channel accepted the message.
    Delivered {
        /// Success or failure notification.
        kind: NotificationKind,
        /// The accepting channel.
        channel: String,
        /// Every attempt made.
        attempts: Vec<ChannelAttempt>,
    },
    /// The message could not be built or delivered.
    Failed {
        /// Success or failure notification.
        kind: NotificationKind,
        /// Why it failed.
        error: String,
        /// Every attempt made.
        attempts: Vec<ChannelAttempt>,
    },
}

impl NotificationOutcome {
    /// Returns the notification kind, if one was attempted.
    #[must_use]
    pub fn kind(&self) -> Option<NotificationKind> {
        match self {
            Self::NotConfigured => None,
            Self::Delivered { kind, .. } | Self::Failed { kind, .. } => Some(*kind),
        }
    }

    /// Returns true if the notification was delivered.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Returns the attempt log.
    #[must_use]
    pub fn attempts(&self) -> &[ChannelAttempt] {
        match self {
            Self::NotConfigured => &[],
            Self::Delivered { attempts, .. } | Self::Failed { attempts, .. } => attempts,
        }
    }
}

/// Everything needed to notify stakeholders at the end of a run.
#[derive(Debug, Clone)]
pub struct NotificationPlan {
    notifier: Arc<Notifier>,
    channels: Vec<Channel>,
    recipients: Vec<String>,
    renderer: Arc<dyn MessageRenderer>,
    fallback: PlainRenderer,
}

impl NotificationPlan {
    /// Creates a plan rendering with [`PlainRenderer`].
    #[must_use]
    pub fn new(notifier: Notifier, channels: Vec<Channel>, recipients: Vec<String>) -> Self {
        Self {
            notifier: Arc::new(notifier),
            channels,
            recipients,
            renderer: Arc::new(PlainRenderer::default()),
            fallback: PlainRenderer::default(),
        }
    }

    /// Sets the renderer tried first.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn MessageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Sets the renderer used when the primary renderer fails.
    #[must_use]
    pub fn with_fallback_renderer(mut self, fallback: PlainRenderer) -> Self {
        self.fallback = fallback;
        self
    }

    /// Returns the channels in the order they are tried.
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Renders and sends the notification for a finished run.
    pub async fn dispatch(&self, run: &Run, results: &ResultStore) -> NotificationOutcome {
        let kind = NotificationKind::for_status(run.status());

        let message = match self.renderer.render(run, results) {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    run_id = %run.run_id(),
                    error = %err,
                    "Renderer failed, falling back to plain summary"
                );
                self.fallback.render_run(run)
            }
        };

        let notification =
            match Notification::new(&self.recipients, message.subject, message.html_body) {
                Ok(notification) => notification,
                Err(err) => {
                    return NotificationOutcome::Failed {
                        kind,
                        error: err.to_string(),
                        attempts: Vec::new(),
                    }
                }
            };

        match self.notifier.send(&notification, &self.channels).await {
            Ok(receipt) => NotificationOutcome::Delivered {
                kind,
                channel: receipt.channel,
                attempts: receipt.attempts,
            },
            Err(err) => NotificationOutcome::Failed {
                kind,
                error: err.to_string(),
                attempts: err.attempts,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BatchflowError;
    use crate::notify::{MockTransport, RenderedMessage, SmtpSettings};

    #[derive(Debug)]
    struct BrokenRenderer;

    impl MessageRenderer for BrokenRenderer {
        fn render(&self, _run: &Run, _results: &ResultStore) -> Result<RenderedMessage, BatchflowError> {
            Err(BatchflowError::missing_result(&["generate_report"], "final_report"))
        }
    }

    fn finished(status: RunStatus) -> Run {
        let mut run = Run::start("batch");
        run.finish(status).unwrap();
        run
    }

    fn plan(transport: MockTransport, recipients: Vec<String>) -> NotificationPlan {
        let notifier = Notifier::new(SmtpSettings::default(), "batch@example.com").unwrap();
        NotificationPlan::new(
            notifier,
            vec![Channel::new("primary", Arc::new(transport))],
            recipients,
        )
    }

    #[tokio::test]
    async fn test_failing_renderer_falls_back_to_plain() {
        let mut transport = MockTransport::new();
        transport
            .expect_submit()
            .withf(|_, _, n| n.subject() == crate::notify::FAILURE_SUBJECT)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let plan = plan(transport, vec!["admin@example.com".to_string()])
            .with_renderer(Arc::new(BrokenRenderer));
        let outcome = plan
            .dispatch(&finished(RunStatus::Failed), &ResultStore::new())
            .await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.kind(), Some(NotificationKind::Failure));
    }

    #[tokio::test]
    async fn test_invalid_recipients_fail_without_attempts() {
        let mut transport = MockTransport::new();
        transport.expect_submit().never();

        let outcome = plan(transport, Vec::new())
            .dispatch(&finished(RunStatus::Succeeded), &ResultStore::new())
            .await;

        assert_eq!(outcome.kind(), Some(NotificationKind::Success));
        assert!(!outcome.is_delivered());
        assert!(outcome.attempts().is_empty());
    }
}
