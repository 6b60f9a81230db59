//! Validated, immutable task graph.

use super::TaskSpec;
use std::collections::{HashMap, HashSet};

/// A directed acyclic graph of tasks, ready for execution.
///
/// Built by [`super::PipelineBuilder`], which guarantees unique names,
/// resolvable dependencies and the absence of cycles.
#[derive(Debug)]
pub struct TaskGraph {
    /// The pipeline name.
    name: String,
    /// Task definitions.
    tasks: HashMap<String, TaskSpec>,
    /// Execution order (topologically sorted).
    execution_order: Vec<String>,
    /// Direct successors of each task, in insertion order.
    downstream: HashMap<String, Vec<String>>,
    /// Task whose outcome decides the run status.
    end_task: String,
}

impl TaskGraph {
    pub(crate) fn new(
        name: String,
        tasks: HashMap<String, TaskSpec>,
        task_order: &[String],
        end_task: String,
    ) -> Self {
        let execution_order = topological_sort(&tasks, task_order);

        let mut downstream: HashMap<String, Vec<String>> =
            task_order.iter().map(|n| (n.clone(), Vec::new())).collect();
        for child in task_order {
            if let Some(spec) = tasks.get(child) {
                for dep in &spec.dependencies {
                    downstream.entry(dep.clone()).or_default().push(child.clone());
                }
            }
        }

        Self {
            name,
            tasks,
            execution_order,
            downstream,
            end_task,
        }
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

    /// Returns the execution order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Returns the definition of a task.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.get(name)
    }

    /// Returns the direct successors of a task.
    #[must_use]
    pub fn downstream(&self, name: &str) -> &[String] {
        self.downstream.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns the task that decides the run status.
    #[must_use]
    pub fn end_task(&self) -> &str {
        &self.end_task
    }
}

/// Performs topological sort on the task graph.
///
/// Dependencies are visited depth-first from each task in insertion order,
/// so independent tasks keep the order they were added in.
pub(super) fn topological_sort(tasks: &HashMap<String, TaskSpec>, task_order: &[String]) -> Vec<String> {
    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let mut temp_visited = HashSet::new();

    fn visit(
        node: &str,
        tasks: &HashMap<String, TaskSpec>,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if visited.contains(node) || temp_visited.contains(node) {
            return;
        }

        temp_visited.insert(node.to_string());

        if let Some(spec) = tasks.get(node) {
            for dep in &spec.dependencies {
                visit(dep, tasks, visited, temp_visited, result);
            }
        }

        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());
    }

    for name in task_order {
        visit(name, tasks, &mut visited, &mut temp_visited, &mut result);
    }

    result
}
