//! The run: one execution of a pipeline graph.

use super::{RunStatus, TaskExecutionRecord, TaskStatus};
use crate::errors::BatchflowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One execution of a pipeline.
///
/// Records are kept in the order tasks reached a terminal state. Once
/// [`Run::finish`] has set a terminal status the run no longer accepts
/// records or a second status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    run_id: Uuid,
    pipeline: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    status: RunStatus,
    records: Vec<TaskExecutionRecord>,
}

impl Run {
    /// Starts a new run with a generated identifier.
    #[must_use]
    pub fn start(pipeline: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            records: Vec::new(),
        }
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns when the run started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the run finished.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns the run status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Returns the task records in completion order.
    #[must_use]
    pub fn records(&self) -> &[TaskExecutionRecord] {
        &self.records
    }

    /// Returns the record for a task.
    #[must_use]
    pub fn record(&self, task: &str) -> Option<&TaskExecutionRecord> {
        self.records.iter().find(|r| r.task == task)
    }

    /// Returns the terminal status of a task, if it has one.
    #[must_use]
    pub fn task_status(&self, task: &str) -> Option<TaskStatus> {
        self.record(task).map(|r| r.status)
    }

    /// Returns the first task that failed.
    #[must_use]
    pub fn first_failure(&self) -> Option<&TaskExecutionRecord> {
        self.records.iter().find(|r| r.status == TaskStatus::Failed)
    }

    /// Appends a finalized task record.
    ///
    /// # Errors
    ///
    /// Returns `RunAlreadyFinished` if the run is terminal.
    pub fn push_record(&mut self, record: TaskExecutionRecord) -> Result<(), BatchflowError> {
        self.ensure_running()?;
        self.records.push(record);
        Ok(())
    }

    /// Sets the terminal status.
    ///
    /// # Errors
    ///
    /// Returns `RunAlreadyFinished` if a terminal status was already set.
    pub fn finish(&mut self, status: RunStatus) -> Result<(), BatchflowError> {
        self.ensure_running()?;
        self.status = status;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Wall-clock duration in milliseconds, if finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    fn ensure_running(&self) -> Result<(), BatchflowError> {
        if self.status.is_terminal() {
            return Err(BatchflowError::RunAlreadyFinished {
                run_id: self.run_id.to_string(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }
}
