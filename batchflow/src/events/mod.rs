//! Lifecycle events emitted by the pipeline engine.
//!
//! Every event carries the run it belongs to; task events also name the task.
//! Sinks decide what to do with them: log, collect or drop.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A run was created.
    #[serde(rename = "run.started")]
    RunStarted,
    /// A task began its first attempt.
    #[serde(rename = "task.started")]
    TaskStarted,
    /// A failed attempt will be retried.
    #[serde(rename = "task.retrying")]
    TaskRetrying,
    /// A task finished successfully.
    #[serde(rename = "task.succeeded")]
    TaskSucceeded,
    /// A task exhausted its attempts or hit a fatal error.
    #[serde(rename = "task.failed")]
    TaskFailed,
    /// A task was never invoked.
    #[serde(rename = "task.skipped")]
    TaskSkipped,
    /// A branch decision selected a successor.
    #[serde(rename = "branch.selected")]
    BranchSelected,
    /// The run reached a terminal status.
    #[serde(rename = "run.completed")]
    RunCompleted,
    /// The end-of-run notification was delivered.
    #[serde(rename = "notification.sent")]
    NotificationSent,
    /// The end-of-run notification could not be delivered.
    #[serde(rename = "notification.failed")]
    NotificationFailed,
}

impl EventKind {
    /// Returns the dotted event name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStarted => "run.started",
            Self::TaskStarted => "task.started",
            Self::TaskRetrying => "task.retrying",
            Self::TaskSucceeded => "task.succeeded",
            Self::TaskFailed => "task.failed",
            Self::TaskSkipped => "task.skipped",
            Self::BranchSelected => "branch.selected",
            Self::RunCompleted => "run.completed",
            Self::NotificationSent => "notification.sent",
            Self::NotificationFailed => "notification.failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// What happened.
    pub kind: EventKind,
    /// The run it happened in.
    pub run_id: Uuid,
    /// The task involved, for task and branch events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Event-specific details.
    #[serde(default)]
    pub data: serde_json::Value,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    /// Creates a run-level event.
    #[must_use]
    pub fn run(kind: EventKind, run_id: Uuid) -> Self {
        Self {
            kind,
            run_id,
            task: None,
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// Creates a task-level event.
    #[must_use]
    pub fn task(kind: EventKind, run_id: Uuid, task: impl Into<String>) -> Self {
        Self {
            task: Some(task.into()),
            ..Self::run(kind, run_id)
        }
    }

    /// Attaches details.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
