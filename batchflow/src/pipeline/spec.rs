//! Task definitions.

use super::RetryPolicy;
use crate::core::TriggerRule;
use crate::errors::{CycleDetectedError, PipelineValidationError};
use crate::tasks::{BranchDecision, NoOpTask, Task};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The executable unit of a graph node.
#[derive(Debug, Clone)]
pub enum TaskNode {
    /// A task that does work and publishes results.
    Work(Arc<dyn Task>),
    /// A task that selects one of its successors.
    Branch(Arc<dyn BranchDecision>),
}

impl TaskNode {
    /// Returns true for branch decisions.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self, Self::Branch(_))
    }
}

/// Definition of a single task in a pipeline.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// The unique name of the task.
    pub name: String,
    /// The executable unit.
    pub node: TaskNode,
    /// Retry policy applied to every invocation.
    pub retry: RetryPolicy,
    /// Names of tasks this task depends on.
    pub dependencies: BTreeSet<String>,
    /// Rule evaluated against the upstream terminal states.
    pub trigger_rule: TriggerRule,
}

impl TaskSpec {
    /// Creates a plain task definition.
    #[must_use]
    pub fn new(name: impl Into<String>, task: Arc<dyn Task>) -> Self {
        Self::with_node(name, TaskNode::Work(task))
    }

    /// Creates a branch decision definition.
    #[must_use]
    pub fn branch(name: impl Into<String>, decision: Arc<dyn BranchDecision>) -> Self {
        Self::with_node(name, TaskNode::Branch(decision))
    }

    /// Creates a no-op marker task.
    #[must_use]
    pub fn marker(name: impl Into<String>) -> Self {
        let name = name.into();
        let task = Arc::new(NoOpTask::new(name.clone()));
        Self::new(name, task)
    }

    fn with_node(name: impl Into<String>, node: TaskNode) -> Self {
        Self {
            name: name.into(),
            node,
            retry: RetryPolicy::default(),
            dependencies: BTreeSet::new(),
            trigger_rule: TriggerRule::default(),
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the trigger rule.
    #[must_use]
    pub fn with_trigger_rule(mut self, rule: TriggerRule) -> Self {
        self.trigger_rule = rule;
        self
    }

    /// Validates the task definition in isolation.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank, the task depends on itself, or
    /// the retry policy allows no attempt.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Task name cannot be empty"));
        }
        if self.dependencies.contains(&self.name) {
            return Err(CycleDetectedError::new(vec![self.name.clone(), self.name.clone()]).into());
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineValidationError::new(format!(
                "Task '{}' must allow at least one attempt",
                self.name
            ))
            .with_tasks(vec![self.name.clone()]));
        }
        Ok(())
    }
}
