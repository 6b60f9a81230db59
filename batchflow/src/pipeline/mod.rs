//! Pipeline building and execution.
//!
//! This module provides:
//! - Task definitions and retry policies
//! - The pipeline builder with graph validation
//! - The engine that drives one run at a time per call

mod builder;
mod engine;
mod graph;
mod retry;
mod spec;

pub use builder::PipelineBuilder;
pub use engine::{PipelineEngine, RunReport, SELECTED_BRANCH_KEY};
pub use graph::TaskGraph;
pub use retry::{RetryDecision, RetryPolicy};
pub use spec::{TaskNode, TaskSpec};
