//! Task status, run status and trigger rule enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting for its upstreams.
    #[default]
    Pending,
    /// Task is currently running.
    Running,
    /// Task completed successfully.
    Success,
    /// Task exhausted its attempts or hit a fatal error.
    Failed,
    /// Task was not invoked.
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl TaskStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }
}

/// The status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Tasks are still being driven.
    #[default]
    Running,
    /// The end task was reached without an unrouted failure.
    Succeeded,
    /// A required task failed.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl RunStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Policy deciding whether a task runs given its upstreams' terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerRule {
    /// Every upstream must have succeeded.
    #[default]
    AllUpstreamSucceeded,
    /// At least one upstream succeeded; used to join mutually exclusive branches.
    AnyUpstreamSucceeded,
    /// At least one upstream failed; used by failure handling paths.
    OneUpstreamFailed,
}

impl fmt::Display for TriggerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllUpstreamSucceeded => write!(f, "all-upstream-succeeded"),
            Self::AnyUpstreamSucceeded => write!(f, "any-upstream-succeeded"),
            Self::OneUpstreamFailed => write!(f, "one-upstream-failed"),
        }
    }
}

impl TriggerRule {
    /// Evaluates the rule against the terminal states of every upstream.
    ///
    /// A task without upstreams is always satisfied.
    #[must_use]
    pub fn is_satisfied(&self, upstream: &[TaskStatus]) -> bool {
        if upstream.is_empty() {
            return true;
        }
        match self {
            Self::AllUpstreamSucceeded => upstream.iter().all(|s| *s == TaskStatus::Success),
            Self::AnyUpstreamSucceeded => upstream.iter().any(|s| *s == TaskStatus::Success),
            Self::OneUpstreamFailed => upstream.iter().any(|s| *s == TaskStatus::Failed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskStatus::{Failed, Skipped, Success};

    #[test]
    fn test_task_status_is_terminal() {
        assert!(Success.is_terminal());
        assert!(Skipped.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_all_upstream_succeeded() {
        let rule = TriggerRule::AllUpstreamSucceeded;
        assert!(rule.is_satisfied(&[Success, Success]));
        assert!(!rule.is_satisfied(&[Success, Skipped]));
        assert!(!rule.is_satisfied(&[Failed]));
    }

    #[test]
    fn test_any_upstream_succeeded_tolerates_skipped_sibling() {
        let rule = TriggerRule::AnyUpstreamSucceeded;
        assert!(rule.is_satisfied(&[Skipped, Success]));
        assert!(!rule.is_satisfied(&[Skipped, Skipped]));
        assert!(!rule.is_satisfied(&[Failed, Skipped]));
    }

    #[test]
    fn test_one_upstream_failed() {
        let rule = TriggerRule::OneUpstreamFailed;
        assert!(rule.is_satisfied(&[Success, Failed]));
        assert!(!rule.is_satisfied(&[Success, Skipped]));
    }

    #[test]
    fn test_root_task_always_satisfied() {
        assert!(TriggerRule::OneUpstreamFailed.is_satisfied(&[]));
    }

    #[test]
    fn test_trigger_rule_serialize() {
        let json = serde_json::to_string(&TriggerRule::AnyUpstreamSucceeded).unwrap();
        assert_eq!(json, r#""any-upstream-succeeded""#);
        assert_eq!(TriggerRule::OneUpstreamFailed.to_string(), "one-upstream-failed");
    }

    #[test]
    fn test_status_serialize() {
        assert_eq!(serde_json::to_string(&Skipped).unwrap(), r#""skipped""#);
        assert_eq!(RunStatus::Succeeded.to_string(), "succeeded");
    }
}
