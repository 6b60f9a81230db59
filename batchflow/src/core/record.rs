//! Per-task execution records.

use super::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Attempt number (1-indexed).
    pub attempt: u32,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// Whether the unit of work reported success.
    pub succeeded: bool,
    /// Error detail for a failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wait scheduled before the next attempt, if one follows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

/// The execution record of one task in one run.
///
/// Created when the task starts, appended to on every attempt and finalized
/// exactly once with a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    /// The task name.
    pub task: String,
    /// Current status.
    pub status: TaskStatus,
    /// Attempts made, in order.
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
    /// Last error detail if the task failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Kind of the last error if the task failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Why the task was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// When the record was created.
    pub started_at: DateTime<Utc>,
    /// When the record was finalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskExecutionRecord {
    /// Creates a record for a task that is starting.
    #[must_use]
    pub fn running(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            status: TaskStatus::Running,
            attempts: Vec::new(),
            error: None,
            error_kind: None,
            skip_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Creates a finalized record for a task that was never invoked.
    #[must_use]
    pub fn skipped(task: impl Into<String>, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task: task.into(),
            status: TaskStatus::Skipped,
            attempts: Vec::new(),
            error: None,
            error_kind: None,
            skip_reason: Some(reason.into()),
            started_at: now,
            finished_at: Some(now),
        }
    }

    /// Records the start of a new attempt and returns its number.
    pub fn begin_attempt(&mut self) -> u32 {
        let attempt = self.attempt_count() + 1;
        self.attempts.push(AttemptRecord {
            attempt,
            started_at: Utc::now(),
            succeeded: false,
            error: None,
            retry_delay_ms: None,
        });
        attempt
    }

    /// Marks the current attempt as successful.
    pub fn attempt_succeeded(&mut self) {
        if let Some(last) = self.attempts.last_mut() {
            last.succeeded = true;
        }
    }

    /// Marks the current attempt as failed.
    pub fn attempt_failed(&mut self, error: impl Into<String>) {
        if let Some(last) = self.attempts.last_mut() {
            last.succeeded = false;
            last.error = Some(error.into());
        }
    }

    /// Notes the wait scheduled after the current attempt.
    pub fn schedule_retry(&mut self, delay_ms: u64) {
        if let Some(last) = self.attempts.last_mut() {
            last.retry_delay_ms = Some(delay_ms);
        }
    }

    /// Finalizes the record as successful.
    pub fn finish_success(&mut self) {
        self.status = TaskStatus::Success;
        self.finished_at = Some(Utc::now());
    }

    /// Finalizes the record as failed.
    pub fn finish_failed(&mut self, kind: impl Into<String>, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error_kind = Some(kind.into());
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Number of attempts made.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        u32::try_from(self.attempts.len()).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_are_numbered() {
        let mut record = TaskExecutionRecord::running("read_data");
        assert_eq!(record.begin_attempt(), 1);
        record.attempt_failed("file locked");
        record.schedule_retry(120_000);
        assert_eq!(record.begin_attempt(), 2);
        record.attempt_succeeded();
        record.finish_success();

        assert_eq!(record.attempt_count(), 2);
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.attempts[0].retry_delay_ms, Some(120_000));
        assert!(record.attempts[1].succeeded);
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_skipped_record_has_no_attempts() {
        let record = TaskExecutionRecord::skipped("process_regular_employees", "branch not selected");
        assert_eq!(record.status, TaskStatus::Skipped);
        assert_eq!(record.attempt_count(), 0);
        assert_eq!(record.skip_reason.as_deref(), Some("branch not selected"));
    }

    #[test]
    fn test_failed_record_keeps_last_error() {
        let mut record = TaskExecutionRecord::running("analyze_data");
        record.begin_attempt();
        record.attempt_failed("boom");
        record.finish_failed("ExecutionError", "boom");

        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert_eq!(record.error_kind.as_deref(), Some("ExecutionError"));
    }
}
