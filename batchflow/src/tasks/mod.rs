//! Task and branch decision traits with closure-based implementations.
//!
//! Tasks are the units of work in a batchflow pipeline. A branch decision is
//! a task whose result is the name of the single successor to continue with.

use crate::context::TaskContext;
use crate::errors::BatchflowError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt::Debug;

/// Trait for plain pipeline tasks.
///
/// A task reads upstream results from the context, does its work and
/// publishes its own results. Returning an error fails the attempt; the
/// engine decides whether to retry based on the task's policy and
/// [`BatchflowError::is_retryable`].
#[async_trait]
pub trait Task: Send + Sync + Debug {
    /// Returns the name of the task.
    fn name(&self) -> &str;

    /// Executes one attempt of the task.
    async fn execute(&self, ctx: &TaskContext) -> Result<(), BatchflowError>;
}

/// Trait for branch decisions.
#[async_trait]
pub trait BranchDecision: Send + Sync + Debug {
    /// Returns the name of the task.
    fn name(&self) -> &str;

    /// Returns the name of the downstream task to continue with.
    ///
    /// The engine publishes the returned name under
    /// [`SELECTED_BRANCH_KEY`](crate::pipeline::SELECTED_BRANCH_KEY). The
    /// decision may publish other diagnostic results through `ctx`; if it
    /// publishes that key itself, the value must equal the returned name.
    async fn decide(&self, ctx: &TaskContext) -> Result<String, BatchflowError>;
}

/// Boxed future returned by closure tasks.
pub type TaskFuture<T> = BoxFuture<'static, Result<T, BatchflowError>>;

/// A closure-based task.
pub struct FnTask<F>
where
    F: Fn(TaskContext) -> TaskFuture<()> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnTask<F>
where
    F: Fn(TaskContext) -> TaskFuture<()> + Send + Sync,
{
    /// Creates a new closure-based task.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnTask<F>
where
    F: Fn(TaskContext) -> TaskFuture<()> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Task for FnTask<F>
where
    F: Fn(TaskContext) -> TaskFuture<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), BatchflowError> {
        (self.func)(ctx.clone()).await
    }
}

/// A closure-based branch decision.
pub struct FnBranch<F>
where
    F: Fn(TaskContext) -> TaskFuture<String> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnBranch<F>
where
    F: Fn(TaskContext) -> TaskFuture<String> + Send + Sync,
{
    /// Creates a new closure-based branch decision.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnBranch<F>
where
    F: Fn(TaskContext) -> TaskFuture<String> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnBranch").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> BranchDecision for FnBranch<F>
where
    F: Fn(TaskContext) -> TaskFuture<String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&self, ctx: &TaskContext) -> Result<String, BatchflowError> {
        (self.func)(ctx.clone()).await
    }
}

/// A task that does nothing; used for start, join and end markers.
#[derive(Debug, Clone)]
pub struct NoOpTask {
    name: String,
}

impl NoOpTask {
    /// Creates a new no-op task.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Task for NoOpTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &TaskContext) -> Result<(), BatchflowError> {
        Ok(())
    }
}
