//! Run-scoped data exchange between tasks.
//!
//! This module provides:
//! - The write-once result store shared by the tasks of one run
//! - The per-attempt task context that stages a task's writes

mod store;
mod task_context;

pub use store::ResultStore;
pub use task_context::TaskContext;
