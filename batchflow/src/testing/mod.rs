//! Testing utilities for batchflow pipelines.
//!
//! This module provides:
//! - Mock tasks, branch decisions and transports
//! - Assertions over finished runs
//! - Employee dataset fixtures

mod assertions;
mod fixtures;
mod mocks;

pub use crate::events::CollectingEventSink;
pub use assertions::{
    assert_attempts, assert_attempts_within_policy, assert_never_invoked, assert_task_status,
};
pub use fixtures::{
    employees, sample_employees, write_employee_csv, write_raw_csv, EMPLOYEE_HEADER,
};
pub use mocks::{FailingTask, FixedBranch, RecordingTask, Scripted, ScriptedTransport};
