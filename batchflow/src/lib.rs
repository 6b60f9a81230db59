//! # Batchflow
//!
//! A batch pipeline core: a graph of tasks with retry policies, trigger rules
//! and branch decisions, a write-once result store for passing data between
//! tasks, and a notifier that falls back across mail channels.
//!
//! Batchflow provides:
//!
//! - **Task graphs**: validated, acyclic, executed in topological order
//! - **Retries**: per-task attempts with fixed or capped exponential backoff
//! - **Branching and joins**: a branch decision picks one successor; trigger
//!   rules decide whether a task runs given its upstreams
//! - **Notifications**: exactly one success or failure message per run
//! - **Lifecycle events**: structured events for every run and attempt
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use batchflow::prelude::*;
//!
//! let graph = PipelineBuilder::new("nightly")
//!     .task("extract", Arc::new(ExtractTask), &[])?
//!     .task("load", Arc::new(LoadTask), &["extract"])?
//!     .build()?;
//!
//! let report = PipelineEngine::new(graph).execute().await;
//! assert!(report.succeeded());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod batch;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod notify;
pub mod pipeline;
pub mod tasks;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{BatchConfig, RecipientConfig};
    pub use crate::context::{ResultStore, TaskContext};
    pub use crate::core::{
        AttemptRecord, Run, RunStatus, TaskExecutionRecord, TaskStatus, TriggerRule,
    };
    pub use crate::errors::{
        BatchflowError, ContractErrorInfo, CycleDetectedError, DataSourceError,
        NotificationDeliveryFailed, PipelineValidationError, TransportError,
    };
    pub use crate::events::{
        EventKind, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
    };
    pub use crate::notify::{
        Channel, MessageRenderer, Notification, NotificationOutcome, NotificationPlan, Notifier,
        SmtpSettings, Transport,
    };
    pub use crate::pipeline::{
        PipelineBuilder, PipelineEngine, RetryPolicy, RunReport, TaskGraph, TaskSpec,
    };
    pub use crate::tasks::{BranchDecision, FnBranch, FnTask, NoOpTask, Task, TaskFuture};
    pub use std::sync::Arc;
}
