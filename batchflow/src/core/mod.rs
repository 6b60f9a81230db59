//! Core domain model types for batchflow.
//!
//! This module contains the fundamental types used throughout the framework:
//! - Task status, run status and trigger rules
//! - Per-task execution records
//! - The run itself

mod record;
mod run;
mod status;

pub use record::{AttemptRecord, TaskExecutionRecord};
pub use run::Run;
pub use status::{RunStatus, TaskStatus, TriggerRule};
