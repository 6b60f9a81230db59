//! Test assertions for finished runs.

use crate::core::{Run, TaskStatus};
use crate::pipeline::TaskGraph;

/// Asserts that `task` finished with `expected`.
pub fn assert_task_status(run: &Run, task: &str, expected: TaskStatus) {
    let actual = run.task_status(task);
    assert_eq!(
        actual,
        Some(expected),
        "Expected task '{task}' to be {expected}, got {actual:?}"
    );
}

/// Asserts that `task` was attempted exactly `expected` times.
pub fn assert_attempts(run: &Run, task: &str, expected: u32) {
    let actual = run.record(task).map(|r| r.attempt_count());
    assert_eq!(
        actual,
        Some(expected),
        "Expected {expected} attempts of '{task}', got {actual:?}"
    );
}

/// Asserts that no task was attempted more often than its policy allows.
pub fn assert_attempts_within_policy(run: &Run, graph: &TaskGraph) {
    for record in run.records() {
        let Some(spec) = graph.spec(&record.task) else {
            panic!("Run recorded unknown task '{}'", record.task);
        };
        assert!(
            record.attempt_count() <= spec.retry.max_attempts,
            "Task '{}' made {} attempts, policy allows {}",
            record.task,
            record.attempt_count(),
            spec.retry.max_attempts
        );
    }
}

/// Asserts that `task` was skipped and never invoked.
pub fn assert_never_invoked(run: &Run, task: &str) {
    assert_task_status(run, task, TaskStatus::Skipped);
    assert_attempts(run, task, 0);
}
