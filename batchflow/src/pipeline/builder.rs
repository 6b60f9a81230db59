//! Pipeline builder with validation.

use super::graph::topological_sort;
use super::{TaskGraph, TaskSpec};
use crate::errors::{ContractErrorInfo, CycleDetectedError, PipelineValidationError};
use crate::tasks::{BranchDecision, Task};
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for creating validated task graphs.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// The task definitions.
    tasks: HashMap<String, TaskSpec>,
    /// Insertion order for tasks.
    task_order: Vec<String>,
    /// Explicit end task, if any.
    end_task: Option<String>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: HashMap::new(),
            task_order: Vec::new(),
            end_task: None,
        }
    }

    /// Adds a plain task with default retry policy and trigger rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken or the definition is invalid.
    pub fn task(
        mut self,
        name: impl Into<String>,
        task: Arc<dyn Task>,
        dependencies: &[&str],
    ) -> Result<Self, PipelineValidationError> {
        let spec = TaskSpec::new(name, task).with_dependencies(dependencies.iter().copied());
        self.add_task_spec(spec)?;
        Ok(self)
    }

    /// Adds a branch decision with default retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn branch(
        mut self,
        name: impl Into<String>,
        decision: Arc<dyn BranchDecision>,
        dependencies: &[&str],
    ) -> Result<Self, PipelineValidationError> {
        let spec = TaskSpec::branch(name, decision).with_dependencies(dependencies.iter().copied());
        self.add_task_spec(spec)?;
        Ok(self)
    }

    /// Adds a fully configured task definition.
    ///
    /// Dependencies may name tasks that are added later; they are resolved
    /// by [`Self::build`].
    ///
    /// # Errors
    ///
    /// Returns an error if the definition is invalid or the name is taken.
    pub fn add_task_spec(&mut self, spec: TaskSpec) -> Result<(), PipelineValidationError> {
        spec.validate()?;

        if self.tasks.contains_key(&spec.name) {
            return Err(PipelineValidationError::new(format!(
                "Task '{}' is defined twice",
                spec.name
            ))
            .with_tasks(vec![spec.name.clone()])
            .with_error_info(
                ContractErrorInfo::new(
                    "GRAPH-003-DUPLICATE",
                    format!("Task name '{}' is not unique", spec.name),
                )
                .with_fix_hint("Give every task in the pipeline a distinct name."),
            ));
        }

        self.task_order.push(spec.name.clone());
        self.tasks.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Adds a task definition, consuming and returning the builder.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn with_task_spec(mut self, spec: TaskSpec) -> Result<Self, PipelineValidationError> {
        self.add_task_spec(spec)?;
        Ok(self)
    }

    /// Designates the task whose outcome decides the run status.
    ///
    /// Defaults to the last task in execution order.
    #[must_use]
    pub fn end_task(mut self, name: impl Into<String>) -> Self {
        self.end_task = Some(name.into());
        self
    }

    /// Builds the task graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder has no tasks, a dependency is unknown,
    /// the dependencies form a cycle, the end task is unknown, or a branch
    /// decision has no successors.
    pub fn build(self) -> Result<TaskGraph, PipelineValidationError> {
        if self.tasks.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no tasks").with_error_info(
                ContractErrorInfo::new("GRAPH-004-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one task to the pipeline before building."),
            ));
        }

        self.check_dependencies()?;
        self.check_acyclic()?;

        if let Some(ref end) = self.end_task {
            if !self.tasks.contains_key(end) {
                return Err(PipelineValidationError::new(format!(
                    "End task '{end}' is not part of the pipeline"
                ))
                .with_tasks(vec![end.clone()])
                .with_error_info(ContractErrorInfo::new(
                    "GRAPH-005-END_TASK",
                    format!("End task '{end}' not found"),
                )));
            }
        }

        for spec in self.tasks.values().filter(|s| s.node.is_branch()) {
            let has_successor = self
                .tasks
                .values()
                .any(|other| other.dependencies.contains(&spec.name));
            if !has_successor {
                return Err(PipelineValidationError::new(format!(
                    "Branch decision '{}' has no downstream tasks",
                    spec.name
                ))
                .with_tasks(vec![spec.name.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "GRAPH-006-BRANCH",
                        format!("Branch '{}' cannot select anything", spec.name),
                    )
                    .with_fix_hint("Add the candidate tasks with the branch as their dependency."),
                ));
            }
        }

        let graph_end = match self.end_task {
            Some(end) => end,
            None => topological_sort(&self.tasks, &self.task_order)
                .pop()
                .unwrap_or_default(),
        };

        Ok(TaskGraph::new(self.name, self.tasks, &self.task_order, graph_end))
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    fn check_dependencies(&self) -> Result<(), PipelineValidationError> {
        for name in &self.task_order {
            let Some(spec) = self.tasks.get(name) else {
                continue;
            };
            if let Some(dep) = spec.dependencies.iter().find(|d| !self.tasks.contains_key(*d)) {
                return Err(PipelineValidationError::new(format!(
                    "Task '{name}' depends on unknown task '{dep}'"
                ))
                .with_tasks(vec![name.clone(), dep.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "GRAPH-002-MISSING_DEP",
                        format!("Dependency '{dep}' not found"),
                    )
                    .with_fix_hint("Add the dependency to the pipeline or remove it from the task."),
                ));
            }
        }
        Ok(())
    }

    /// Peels off tasks whose dependencies are all resolved. Whatever is left
    /// sits on or behind a cycle; following unresolved dependencies from any
    /// leftover task must revisit one of them.
    fn check_acyclic(&self) -> Result<(), CycleDetectedError> {
        let mut pending: HashMap<&str, usize> = self
            .tasks
            .iter()
            .map(|(name, spec)| (name.as_str(), spec.dependencies.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (name, spec) in &self.tasks {
            for dep in &spec.dependencies {
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
            }
        }

        let mut ready: Vec<&str> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(name, _)| *name)
            .collect();
        while let Some(done) = ready.pop() {
            pending.remove(done);
            for child in dependents.get(done).into_iter().flatten() {
                if let Some(n) = pending.get_mut(child) {
                    *n -= 1;
                    if *n == 0 {
                        ready.push(*child);
                    }
                }
            }
        }

        let Some(start) = self
            .task_order
            .iter()
            .find(|name| pending.contains_key(name.as_str()))
        else {
            return Ok(());
        };

        let mut path: Vec<String> = Vec::new();
        let mut current = start.as_str();
        loop {
            if let Some(pos) = path.iter().position(|n| n == current) {
                let mut cycle = path.split_off(pos);
                cycle.push(current.to_string());
                return Err(CycleDetectedError::new(cycle));
            }
            path.push(current.to_string());
            let next = self.tasks.get(current).and_then(|spec| {
                spec.dependencies
                    .iter()
                    .find(|d| pending.contains_key(d.as_str()))
            });
            match next {
                Some(dep) => current = dep.as_str(),
                None => return Err(CycleDetectedError::new(path)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{FnBranch, NoOpTask, TaskFuture};
    use crate::context::TaskContext;
    use futures::FutureExt;

    fn noop(name: &str) -> Arc<dyn Task> {
        Arc::new(NoOpTask::new(name))
    }

    fn pick(target: &'static str) -> Arc<dyn BranchDecision> {
        Arc::new(FnBranch::new("pick", move |_ctx: TaskContext| -> TaskFuture<String> {
            async move { Ok(target.to_string()) }.boxed()
        }))
    }

    #[test]
    fn test_builder_creation() {
        let builder = PipelineBuilder::new("test");
        assert_eq!(builder.name(), "test");
        assert_eq!(builder.task_count(), 0);
    }

    #[test]
    fn test_builder_with_dependencies() {
        let builder = PipelineBuilder::new("test")
            .task("a", noop("a"), &[])
            .unwrap()
            .task("b", noop("b"), &["a"])
            .unwrap();

        assert_eq!(builder.task_count(), 2);
    }

    #[test]
    fn test_builder_missing_dependency() {
        let err = PipelineBuilder::new("test")
            .task("a", noop("a"), &["missing"])
            .unwrap()
            .build()
            .unwrap_err();

        assert_eq!(err.code(), Some("GRAPH-002-MISSING_DEP"));
        assert_eq!(err.tasks, vec!["a".to_string(), "missing".to_string()]);
    }

    #[test]
    fn test_builder_accepts_forward_reference() {
        let graph = PipelineBuilder::new("test")
            .task("report", noop("report"), &["load"])
            .unwrap()
            .task("load", noop("load"), &[])
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(graph.execution_order(), ["load", "report"]);
        assert_eq!(graph.end_task(), "report");
    }

    #[test]
    fn test_builder_duplicate_name() {
        let err = PipelineBuilder::new("test")
            .task("a", noop("a"), &[])
            .unwrap()
            .task("a", noop("a"), &[])
            .unwrap_err();

        assert_eq!(err.code(), Some("GRAPH-003-DUPLICATE"));
    }

    #[test]
    fn test_builder_cycle_detection() {
        let err = PipelineBuilder::new("test")
            .task("start", noop("start"), &[])
            .unwrap()
            .task("a", noop("a"), &["start", "c"])
            .unwrap()
            .task("b", noop("b"), &["a"])
            .unwrap()
            .task("c", noop("c"), &["b"])
            .unwrap()
            .build()
            .unwrap_err();

        assert_eq!(err.code(), Some("GRAPH-001-CYCLE"));
        assert_eq!(err.tasks.first(), err.tasks.last());
        assert_eq!(err.tasks.len(), 4);
        assert!(!err.tasks.contains(&"start".to_string()));
    }

    #[test]
    fn test_builder_ignores_tasks_behind_a_cycle() {
        let err = PipelineBuilder::new("test")
            .task("x", noop("x"), &["y"])
            .unwrap()
            .task("y", noop("y"), &["x"])
            .unwrap()
            .task("after", noop("after"), &["y"])
            .unwrap()
            .build()
            .unwrap_err();

        assert_eq!(err.code(), Some("GRAPH-001-CYCLE"));
        assert_eq!(err.tasks, vec!["x".to_string(), "y".to_string(), "x".to_string()]);
    }

    #[test]
    fn test_builder_empty_build() {
        let err = PipelineBuilder::new("test").build().unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-004-EMPTY"));
    }

    #[test]
    fn test_builder_unknown_end_task() {
        let err = PipelineBuilder::new("test")
            .task("a", noop("a"), &[])
            .unwrap()
            .end_task("end")
            .build()
            .unwrap_err();

        assert_eq!(err.code(), Some("GRAPH-005-END_TASK"));
    }

    #[test]
    fn test_branch_without_successors() {
        let err = PipelineBuilder::new("test")
            .branch("pick", pick("x"), &[])
            .unwrap()
            .build()
            .unwrap_err();

        assert_eq!(err.code(), Some("GRAPH-006-BRANCH"));
    }

    #[test]
    fn test_default_end_task_is_last_in_order() {
        let graph = PipelineBuilder::new("test")
            .task("a", noop("a"), &[])
            .unwrap()
            .task("b", noop("b"), &["a"])
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(graph.end_task(), "b");
    }
}
