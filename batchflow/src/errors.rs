//! Error types for the batchflow framework.
//!
//! Every fallible operation in the crate returns [`BatchflowError`]. The
//! retry loop consults [`BatchflowError::is_retryable`] to decide whether a
//! failed attempt may be re-invoked.

use crate::notify::ChannelAttempt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for batchflow operations.
#[derive(Debug, Error)]
pub enum BatchflowError {
    /// The task graph is malformed.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The task graph contains a cycle.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// The input dataset could not be used.
    #[error("{0}")]
    DataSource(#[from] DataSourceError),

    /// A result was published twice under the same (task, key).
    #[error("Duplicate result: task '{task}' already published '{key}'")]
    DuplicateResult {
        /// The producing task.
        task: String,
        /// The result key.
        key: String,
    },

    /// A result was fetched before it was published.
    #[error("Missing result: no '{key}' published by {}", tasks.join(" or "))]
    MissingResult {
        /// The candidate producing tasks, in lookup order.
        tasks: Vec<String>,
        /// The result key.
        key: String,
    },

    /// A branch decision selected a task that is not one of its successors.
    #[error("Invalid branch target: '{branch}' selected '{target}', expected one of {candidates:?}")]
    InvalidBranchTarget {
        /// The branch decision task.
        branch: String,
        /// The name it returned.
        target: String,
        /// The declared downstream tasks.
        candidates: Vec<String>,
    },

    /// A notification transport rejected a submission.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// Every notification channel was exhausted.
    #[error("{0}")]
    NotificationDeliveryFailed(#[from] NotificationDeliveryFailed),

    /// A notification could not be built.
    #[error("Invalid notification: {0}")]
    InvalidNotification(String),

    /// A task's unit of work reported a failure.
    #[error("Task execution error: {0}")]
    Execution(String),

    /// The run was cancelled between attempts.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// A terminal run was finalized a second time.
    #[error("Run {run_id} already finished with status {status}")]
    RunAlreadyFinished {
        /// The run identifier.
        run_id: String,
        /// The status it was finalized with.
        status: String,
    },

    /// Configuration was invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BatchflowError {
    /// Creates a generic task execution error.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Creates a duplicate result error.
    #[must_use]
    pub fn duplicate_result(task: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateResult {
            task: task.into(),
            key: key.into(),
        }
    }

    /// Creates a missing result error.
    #[must_use]
    pub fn missing_result<S: AsRef<str>>(tasks: &[S], key: impl Into<String>) -> Self {
        Self::MissingResult {
            tasks: tasks.iter().map(|t| t.as_ref().to_string()).collect(),
            key: key.into(),
        }
    }

    /// Returns true if a task attempt that failed with this error may be retried.
    ///
    /// Result store violations, invalid branch targets and malformed input are
    /// ordering or data bugs that a re-invocation cannot fix.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Execution(_) | Self::Io(_) => true,
            Self::DataSource(e) => e.is_transient(),
            Self::Transport(e) => e.is_transient(),
            Self::NotificationDeliveryFailed(_) => true,
            Self::Validation(_)
            | Self::CycleDetected(_)
            | Self::DuplicateResult { .. }
            | Self::MissingResult { .. }
            | Self::InvalidBranchTarget { .. }
            | Self::InvalidNotification(_)
            | Self::Cancelled(_)
            | Self::RunAlreadyFinished { .. }
            | Self::Config(_)
            | Self::Serialization(_) => false,
        }
    }

    /// Short machine-readable name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "PipelineValidationError",
            Self::CycleDetected(_) => "CycleDetectedError",
            Self::DataSource(_) => "DataSourceError",
            Self::DuplicateResult { .. } => "DuplicateResult",
            Self::MissingResult { .. } => "MissingResult",
            Self::InvalidBranchTarget { .. } => "InvalidBranchTarget",
            Self::Transport(TransportError::Auth { .. }) => "TransportAuthError",
            Self::Transport(TransportError::Transient { .. }) => "TransportTransientError",
            Self::NotificationDeliveryFailed(_) => "NotificationDeliveryFailed",
            Self::InvalidNotification(_) => "InvalidNotification",
            Self::Execution(_) => "ExecutionError",
            Self::Cancelled(_) => "Cancelled",
            Self::RunAlreadyFinished { .. } => "RunAlreadyFinished",
            Self::Config(_) => "ConfigError",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
        }
    }
}

impl From<serde_json::Error> for BatchflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Metadata about a graph contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-001-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The tasks involved in the error.
    pub tasks: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tasks: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the tasks involved.
    #[must_use]
    pub fn with_tasks(mut self, tasks: Vec<String>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the task graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of tasks forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-001-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        let tasks = err.cycle_path.clone();
        Self::new(err.to_string())
            .with_tasks(tasks)
            .with_error_info(err.error_info)
    }
}

/// Errors raised by the tabular dataset source.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// The input file does not exist.
    #[error("Data file not found: {}", path.display())]
    NotFound {
        /// The configured path.
        path: PathBuf,
    },

    /// The input file exists but has no data rows.
    #[error("Data file is empty: {}", path.display())]
    Empty {
        /// The configured path.
        path: PathBuf,
    },

    /// Required columns are absent from the header.
    #[error("Missing required columns: {missing:?}")]
    MissingColumns {
        /// The absent column names.
        missing: Vec<String>,
    },

    /// A row could not be parsed.
    #[error("Malformed data at {}: {reason}", path.display())]
    Malformed {
        /// The configured path.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// Reading or writing the file failed.
    #[error("Data source IO error at {}: {source}", path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl DataSourceError {
    /// Returns true for failures that may clear up on a later attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Io { .. })
    }
}

/// Errors reported by a notification transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Credentials were rejected; retrying the same transport is pointless.
    #[error("Authentication rejected by {transport}: {reason}")]
    Auth {
        /// The transport name.
        transport: String,
        /// The server's reason.
        reason: String,
    },

    /// Connection, timeout or temporary server failure.
    #[error("Transient failure on {transport}: {reason}")]
    Transient {
        /// The transport name.
        transport: String,
        /// The failure reason.
        reason: String,
    },
}

impl TransportError {
    /// Creates an authentication error.
    #[must_use]
    pub fn auth(transport: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Auth {
            transport: transport.into(),
            reason: reason.into(),
        }
    }

    /// Creates a transient error.
    #[must_use]
    pub fn transient(transport: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            transport: transport.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the same transport may be tried again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Raised when every notification channel has been exhausted.
#[derive(Debug, Clone, Error)]
#[error("Notification delivery failed after {} attempts across all channels", attempts.len())]
pub struct NotificationDeliveryFailed {
    /// Every attempt made, in order.
    pub attempts: Vec<ChannelAttempt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("task", "my_task");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("task"), Some(&"my_task".to_string()));
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> a"));
        assert_eq!(err.error_info.code, "GRAPH-001-CYCLE");
    }

    #[test]
    fn test_store_errors_are_fatal() {
        assert!(!BatchflowError::duplicate_result("t", "k").is_retryable());
        assert!(!BatchflowError::missing_result(&["t"], "k").is_retryable());
        assert!(BatchflowError::execution("boom").is_retryable());
    }

    #[test]
    fn test_missing_result_lists_candidates() {
        let err = BatchflowError::missing_result(&["a", "b"], "processing_results");
        assert_eq!(
            err.to_string(),
            "Missing result: no 'processing_results' published by a or b"
        );
    }

    #[test]
    fn test_data_source_classification() {
        let not_found = DataSourceError::NotFound {
            path: PathBuf::from("/missing.csv"),
        };
        let empty = DataSourceError::Empty {
            path: PathBuf::from("/empty.csv"),
        };
        assert!(BatchflowError::from(not_found).is_retryable());
        assert!(!BatchflowError::from(empty).is_retryable());
    }

    #[test]
    fn test_transport_error_kind() {
        let auth: BatchflowError = TransportError::auth("smtp", "535 bad credentials").into();
        let transient: BatchflowError = TransportError::transient("smtp", "timed out").into();

        assert_eq!(auth.kind(), "TransportAuthError");
        assert_eq!(transient.kind(), "TransportTransientError");
        assert!(!auth.is_retryable());
        assert!(transient.is_retryable());
    }
}
