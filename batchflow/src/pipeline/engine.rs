//! The run state machine.

use super::{RetryDecision, TaskGraph, TaskNode, TaskSpec};
use crate::cancellation::CancellationToken;
use crate::context::{ResultStore, TaskContext};
use crate::core::{Run, RunStatus, TaskExecutionRecord, TaskStatus};
use crate::errors::BatchflowError;
use crate::events::{EventKind, EventSink, NoOpEventSink, PipelineEvent};
use crate::notify::{NotificationOutcome, NotificationPlan};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result key under which a branch decision's selection is published.
pub const SELECTED_BRANCH_KEY: &str = "selected_branch";

/// Outcome of one execution of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// The finished run.
    pub run: Run,
    /// What became of the end-of-run notification.
    pub notification: NotificationOutcome,
}

impl RunReport {
    /// Returns true if the run succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.run.status() == RunStatus::Succeeded
    }
}

/// Drives a [`TaskGraph`] to completion.
///
/// The engine holds no run state: every call to [`PipelineEngine::execute`]
/// creates a fresh [`Run`] and [`ResultStore`], so one engine can serve
/// concurrent runs.
pub struct PipelineEngine {
    graph: Arc<TaskGraph>,
    notifications: Option<NotificationPlan>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("pipeline", &self.graph.name())
            .field("tasks", &self.graph.task_count())
            .field("notifications", &self.notifications.is_some())
            .finish_non_exhaustive()
    }
}

impl PipelineEngine {
    /// Creates an engine without notifications.
    #[must_use]
    pub fn new(graph: TaskGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            notifications: None,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the end-of-run notification plan.
    #[must_use]
    pub fn with_notifications(mut self, plan: NotificationPlan) -> Self {
        self.notifications = Some(plan);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the task graph.
    #[must_use]
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Executes one run.
    pub async fn execute(&self) -> RunReport {
        self.execute_with_cancellation(&CancellationToken::new()).await
    }

    /// Executes one run, stopping further attempts once `cancel` fires.
    pub async fn execute_with_cancellation(&self, cancel: &CancellationToken) -> RunReport {
        let mut run = Run::start(self.graph.name());
        let run_id = run.run_id();
        let store = Arc::new(ResultStore::new());
        let mut states: HashMap<String, TaskStatus> = self
            .graph
            .execution_order()
            .iter()
            .map(|name| (name.clone(), TaskStatus::Pending))
            .collect();

        info!(
            run_id = %run_id,
            pipeline = %self.graph.name(),
            tasks = self.graph.task_count(),
            "Run started"
        );
        self.emit(
            PipelineEvent::run(EventKind::RunStarted, run_id)
                .with_data(json!({"pipeline": self.graph.name()})),
        )
        .await;

        for name in self.graph.execution_order() {
            if states.get(name).is_some_and(TaskStatus::is_terminal) {
                continue;
            }
            let Some(spec) = self.graph.spec(name) else {
                continue;
            };

            let upstream: Vec<(&str, TaskStatus)> = spec
                .dependencies
                .iter()
                .map(|dep| (dep.as_str(), states.get(dep).copied().unwrap_or_default()))
                .collect();
            let statuses: Vec<TaskStatus> = upstream.iter().map(|(_, s)| *s).collect();

            if !spec.trigger_rule.is_satisfied(&statuses) {
                let detail: Vec<String> = upstream
                    .iter()
                    .map(|(dep, status)| format!("{dep}: {status}"))
                    .collect();
                let reason = format!(
                    "trigger rule {} not met by upstream [{}]",
                    spec.trigger_rule,
                    detail.join(", ")
                );
                self.skip(&mut run, &mut states, name, reason).await;
                continue;
            }

            states.insert(name.clone(), TaskStatus::Running);
            let (record, selected) = self.run_task(run_id, spec, &store, cancel).await;
            states.insert(name.clone(), record.status);
            push_record(&mut run, record);

            if let Some(target) = selected {
                info!(run_id = %run_id, branch = %name, selected = %target, "Branch selected");
                self.emit(
                    PipelineEvent::task(EventKind::BranchSelected, run_id, name.as_str())
                        .with_data(json!({"selected": target})),
                )
                .await;

                for sibling in self.graph.downstream(name) {
                    if *sibling == target || states.get(sibling).is_some_and(TaskStatus::is_terminal) {
                        continue;
                    }
                    let reason = format!("branch '{name}' selected '{target}'");
                    self.skip(&mut run, &mut states, sibling, reason).await;
                }
            }
        }

        let status = self.resolve_status(&states);
        if let Err(err) = run.finish(status) {
            error!(run_id = %run_id, error = %err, "Run finalized twice");
        }

        info!(
            run_id = %run_id,
            pipeline = %self.graph.name(),
            status = %run.status(),
            duration_ms = run.duration_ms().unwrap_or_default(),
            "Run completed"
        );
        self.emit(
            PipelineEvent::run(EventKind::RunCompleted, run_id).with_data(json!({
                "status": run.status(),
                "duration_ms": run.duration_ms(),
            })),
        )
        .await;

        let notification = self.notify(&run, &store).await;

        RunReport { run, notification }
    }

    /// Runs one task through its retry loop.
    ///
    /// Returns the finalized record and, for a successful branch decision,
    /// the selected successor.
    async fn run_task(
        &self,
        run_id: Uuid,
        spec: &TaskSpec,
        store: &Arc<ResultStore>,
        cancel: &CancellationToken,
    ) -> (TaskExecutionRecord, Option<String>) {
        let mut record = TaskExecutionRecord::running(&spec.name);
        self.emit(
            PipelineEvent::task(EventKind::TaskStarted, run_id, spec.name.as_str())
                .with_data(json!({"max_attempts": spec.retry.max_attempts})),
        )
        .await;

        loop {
            if cancel.is_cancelled() {
                let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                let err = BatchflowError::Cancelled(reason);
                return (self.fail(run_id, record, &err).await, None);
            }

            let attempt = record.begin_attempt();
            let ctx = TaskContext::new(run_id, &spec.name, attempt, store.clone());

            match self.invoke(spec, &ctx).await {
                Ok(selected) => {
                    record.attempt_succeeded();
                    record.finish_success();
                    info!(
                        run_id = %run_id,
                        task = %spec.name,
                        attempts = attempt,
                        "Task succeeded"
                    );
                    self.emit(
                        PipelineEvent::task(EventKind::TaskSucceeded, run_id, spec.name.as_str())
                            .with_data(json!({"attempts": attempt})),
                    )
                    .await;
                    return (record, selected);
                }
                Err(err) => {
                    record.attempt_failed(err.to_string());

                    match spec.retry.decide(attempt, &err) {
                        RetryDecision::Retry(delay) => {
                            record.schedule_retry(duration_ms(delay));
                            warn!(
                                run_id = %run_id,
                                task = %spec.name,
                                attempt,
                                max_attempts = spec.retry.max_attempts,
                                delay = ?delay,
                                error = %err,
                                "Task attempt failed, retrying"
                            );
                            self.emit(
                                PipelineEvent::task(EventKind::TaskRetrying, run_id, spec.name.as_str())
                                    .with_data(json!({
                                        "attempt": attempt,
                                        "delay_ms": duration_ms(delay),
                                        "error": err.to_string(),
                                    })),
                            )
                            .await;

                            tokio::select! {
                                () = tokio::time::sleep(delay) => {}
                                () = cancel.cancelled() => {}
                            }
                        }
                        RetryDecision::GiveUp | RetryDecision::NotRetryable => {
                            return (self.fail(run_id, record, &err).await, None);
                        }
                    }
                }
            }
        }
    }

    /// Invokes one attempt and commits its results on success.
    async fn invoke(
        &self,
        spec: &TaskSpec,
        ctx: &TaskContext,
    ) -> Result<Option<String>, BatchflowError> {
        let selected = match &spec.node {
            TaskNode::Work(task) => {
                task.execute(ctx).await?;
                None
            }
            TaskNode::Branch(decision) => {
                let target = decision.decide(ctx).await?;
                let candidates = self.graph.downstream(&spec.name);
                if !candidates.iter().any(|c| *c == target) {
                    return Err(BatchflowError::InvalidBranchTarget {
                        branch: spec.name.clone(),
                        target,
                        candidates: candidates.to_vec(),
                    });
                }
                let selection = json!(target);
                if ctx.staged_value(SELECTED_BRANCH_KEY).as_ref() != Some(&selection) {
                    ctx.publish(SELECTED_BRANCH_KEY, selection)?;
                }
                Some(target)
            }
        };
        ctx.commit()?;
        Ok(selected)
    }

    async fn fail(
        &self,
        run_id: Uuid,
        mut record: TaskExecutionRecord,
        err: &BatchflowError,
    ) -> TaskExecutionRecord {
        record.finish_failed(err.kind(), err.to_string());
        error!(
            run_id = %run_id,
            task = %record.task,
            attempts = record.attempt_count(),
            error_kind = err.kind(),
            error = %err,
            "Task failed"
        );
        self.emit(
            PipelineEvent::task(EventKind::TaskFailed, run_id, record.task.as_str()).with_data(json!({
                "attempts": record.attempt_count(),
                "error": err.to_string(),
                "error_kind": err.kind(),
            })),
        )
        .await;
        record
    }

    async fn skip(
        &self,
        run: &mut Run,
        states: &mut HashMap<String, TaskStatus>,
        task: &str,
        reason: String,
    ) {
        info!(run_id = %run.run_id(), task, reason = %reason, "Task skipped");
        self.emit(
            PipelineEvent::task(EventKind::TaskSkipped, run.run_id(), task)
                .with_data(json!({"reason": reason})),
        )
        .await;
        states.insert(task.to_string(), TaskStatus::Skipped);
        push_record(run, TaskExecutionRecord::skipped(task, reason));
    }

    /// Succeeded if the end task succeeded, or was skipped with no failure anywhere.
    fn resolve_status(&self, states: &HashMap<String, TaskStatus>) -> RunStatus {
        let end = states
            .get(self.graph.end_task())
            .copied()
            .unwrap_or_default();
        let any_failed = states.values().any(|s| *s == TaskStatus::Failed);

        match end {
            TaskStatus::Success => RunStatus::Succeeded,
            TaskStatus::Skipped if !any_failed => RunStatus::Succeeded,
            _ => RunStatus::Failed,
        }
    }

    async fn notify(&self, run: &Run, store: &ResultStore) -> NotificationOutcome {
        let Some(plan) = &self.notifications else {
            return NotificationOutcome::NotConfigured;
        };

        let outcome = plan.dispatch(run, store).await;
        let kind = if outcome.is_delivered() {
            EventKind::NotificationSent
        } else {
            EventKind::NotificationFailed
        };
        if let NotificationOutcome::Failed { error, .. } = &outcome {
            error!(run_id = %run.run_id(), error = %error, "Notification not delivered");
        }
        self.emit(
            PipelineEvent::run(kind, run.run_id())
                .with_data(serde_json::to_value(&outcome).unwrap_or_default()),
        )
        .await;
        outcome
    }

    async fn emit(&self, event: PipelineEvent) {
        self.events.emit(&event).await;
    }
}

fn push_record(run: &mut Run, record: TaskExecutionRecord) {
    if let Err(err) = run.push_record(record) {
        error!(run_id = %run.run_id(), error = %err, "Record dropped");
    }
}

fn duration_ms(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TriggerRule;
    use crate::events::CollectingEventSink;
    use crate::pipeline::{PipelineBuilder, RetryPolicy};
    use crate::tasks::{FnBranch, FnTask, NoOpTask, Task, TaskFuture};
    use futures::FutureExt;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn noop(name: &str) -> Arc<dyn Task> {
        Arc::new(NoOpTask::new(name))
    }

    fn flaky(name: &str, failures: u32, calls: Arc<AtomicU32>) -> Arc<dyn Task> {
        Arc::new(FnTask::new(name, move |ctx: TaskContext| -> TaskFuture<()> {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                ctx.publish("value", json!(n))?;
                if n <= failures {
                    return Err(BatchflowError::execution(format!("failure {n}")));
                }
                Ok(())
            }
            .boxed()
        }))
    }

    fn choose(target: &'static str) -> Arc<dyn crate::tasks::BranchDecision> {
        Arc::new(FnBranch::new("choose", move |_ctx: TaskContext| -> TaskFuture<String> {
            async move { Ok(target.to_string()) }.boxed()
        }))
    }

    #[tokio::test]
    async fn test_linear_run_succeeds() {
        let graph = PipelineBuilder::new("linear")
            .task("a", noop("a"), &[])
            .unwrap()
            .task("b", noop("b"), &["a"])
            .unwrap()
            .build()
            .unwrap();
        let sink = Arc::new(CollectingEventSink::new());
        let engine = PipelineEngine::new(graph).with_event_sink(sink.clone());

        let report = engine.execute().await;

        assert!(report.succeeded());
        assert_eq!(report.notification, NotificationOutcome::NotConfigured);
        let tasks: Vec<&str> = report.run.records().iter().map(|r| r.task.as_str()).collect();
        assert_eq!(tasks, vec!["a", "b"]);
        assert_eq!(
            sink.kinds(),
            vec![
                EventKind::RunStarted,
                EventKind::TaskStarted,
                EventKind::TaskSucceeded,
                EventKind::TaskStarted,
                EventKind::TaskSucceeded,
                EventKind::RunCompleted,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_discards_failed_attempt_results() {
        let calls = Arc::new(AtomicU32::new(0));
        let spec = TaskSpec::new("flaky", flaky("flaky", 2, calls.clone()))
            .with_retry(RetryPolicy::fixed(3, Duration::from_secs(60)));
        let graph = PipelineBuilder::new("retry")
            .with_task_spec(spec)
            .unwrap()
            .build()
            .unwrap();

        let started = tokio::time::Instant::now();
        let report = PipelineEngine::new(graph).execute().await;

        assert!(report.succeeded());
        let record = report.run.record("flaky").unwrap();
        assert_eq!(record.attempt_count(), 3);
        assert_eq!(record.attempts[0].retry_delay_ms, Some(60_000));
        assert_eq!(record.attempts[2].retry_delay_ms, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail_run_and_skip_downstream() {
        let calls = Arc::new(AtomicU32::new(0));
        let spec = TaskSpec::new("flaky", flaky("flaky", u32::MAX, calls.clone()))
            .with_retry(RetryPolicy::fixed(2, Duration::from_secs(1)));
        let graph = PipelineBuilder::new("failing")
            .with_task_spec(spec)
            .unwrap()
            .task("after", noop("after"), &["flaky"])
            .unwrap()
            .build()
            .unwrap();

        let report = PipelineEngine::new(graph).execute().await;

        assert_eq!(report.run.status(), RunStatus::Failed);
        let failed = report.run.record("flaky").unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.attempt_count(), 2);
        assert_eq!(failed.error_kind.as_deref(), Some("ExecutionError"));
        assert_eq!(report.run.task_status("after"), Some(TaskStatus::Skipped));
    }

    #[tokio::test]
    async fn test_branch_skips_unselected_sibling() {
        let graph = PipelineBuilder::new("branching")
            .branch("choose", choose("left"), &[])
            .unwrap()
            .task("left", noop("left"), &["choose"])
            .unwrap()
            .task("right", noop("right"), &["choose"])
            .unwrap()
            .with_task_spec(
                TaskSpec::marker("join")
                    .with_dependencies(["left", "right"])
                    .with_trigger_rule(TriggerRule::AnyUpstreamSucceeded),
            )
            .unwrap()
            .build()
            .unwrap();

        let report = PipelineEngine::new(graph).execute().await;

        assert!(report.succeeded());
        assert_eq!(report.run.task_status("left"), Some(TaskStatus::Success));
        assert_eq!(report.run.task_status("right"), Some(TaskStatus::Skipped));
        assert_eq!(report.run.task_status("join"), Some(TaskStatus::Success));
        assert_eq!(
            report.run.record("right").unwrap().skip_reason.as_deref(),
            Some("branch 'choose' selected 'left'")
        );
    }

    #[tokio::test]
    async fn test_invalid_branch_target_fails_once() {
        let graph = PipelineBuilder::new("branching")
            .with_task_spec(
                TaskSpec::branch("choose", choose("nowhere"))
                    .with_retry(RetryPolicy::fixed(3, Duration::ZERO)),
            )
            .unwrap()
            .task("left", noop("left"), &["choose"])
            .unwrap()
            .build()
            .unwrap();

        let report = PipelineEngine::new(graph).execute().await;

        assert_eq!(report.run.status(), RunStatus::Failed);
        let record = report.run.record("choose").unwrap();
        assert_eq!(record.attempt_count(), 1);
        assert_eq!(record.error_kind.as_deref(), Some("InvalidBranchTarget"));
        assert_eq!(report.run.task_status("left"), Some(TaskStatus::Skipped));
    }

    fn self_publishing(
        published: &'static str,
        target: &'static str,
    ) -> Arc<dyn crate::tasks::BranchDecision> {
        Arc::new(FnBranch::new("choose", move |ctx: TaskContext| -> TaskFuture<String> {
            async move {
                ctx.publish(SELECTED_BRANCH_KEY, json!(published))?;
                Ok(target.to_string())
            }
            .boxed()
        }))
    }

    fn two_way(decision: Arc<dyn crate::tasks::BranchDecision>) -> TaskGraph {
        PipelineBuilder::new("branching")
            .with_task_spec(
                TaskSpec::branch("choose", decision).with_retry(RetryPolicy::fixed(1, Duration::ZERO)),
            )
            .unwrap()
            .task("left", noop("left"), &["choose"])
            .unwrap()
            .task("right", noop("right"), &["choose"])
            .unwrap()
            .end_task("choose")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_branch_may_publish_its_own_selection() {
        let engine = PipelineEngine::new(two_way(self_publishing("right", "right")));

        let report = engine.execute().await;

        assert!(report.succeeded());
        assert_eq!(report.run.task_status("right"), Some(TaskStatus::Success));
        assert_eq!(report.run.task_status("left"), Some(TaskStatus::Skipped));
    }

    #[tokio::test]
    async fn test_branch_publishing_conflicting_selection_fails() {
        let engine = PipelineEngine::new(two_way(self_publishing("left", "right")));

        let report = engine.execute().await;

        assert_eq!(report.run.status(), RunStatus::Failed);
        assert_eq!(
            report.run.record("choose").unwrap().error_kind.as_deref(),
            Some("DuplicateResult")
        );
    }

    #[tokio::test]
    async fn test_failure_handler_runs_on_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let graph = PipelineBuilder::new("handler")
            .task("work", flaky("work", u32::MAX, calls), &[])
            .unwrap()
            .with_task_spec(
                TaskSpec::marker("on_failure")
                    .with_dependency("work")
                    .with_trigger_rule(TriggerRule::OneUpstreamFailed),
            )
            .unwrap()
            .end_task("work")
            .build()
            .unwrap();

        let report = PipelineEngine::new(graph).execute().await;

        assert_eq!(report.run.status(), RunStatus::Failed);
        assert_eq!(report.run.task_status("on_failure"), Some(TaskStatus::Success));
    }

    #[tokio::test]
    async fn test_skipped_end_task_without_failure_succeeds() {
        let graph = PipelineBuilder::new("handler")
            .task("work", noop("work"), &[])
            .unwrap()
            .with_task_spec(
                TaskSpec::marker("on_failure")
                    .with_dependency("work")
                    .with_trigger_rule(TriggerRule::OneUpstreamFailed),
            )
            .unwrap()
            .build()
            .unwrap();

        let report = PipelineEngine::new(graph).execute().await;

        assert_eq!(report.run.task_status("on_failure"), Some(TaskStatus::Skipped));
        assert!(report.succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_further_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let spec = TaskSpec::new("flaky", flaky("flaky", u32::MAX, calls.clone()))
            .with_retry(RetryPolicy::fixed(5, Duration::from_secs(300)));
        let graph = PipelineBuilder::new("cancel")
            .with_task_spec(spec)
            .unwrap()
            .build()
            .unwrap();
        let engine = PipelineEngine::new(graph);
        let cancel = CancellationToken::new();

        let (report, ()) = tokio::join!(engine.execute_with_cancellation(&cancel), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            cancel.cancel("operator stop");
        });

        let record = report.run.record("flaky").unwrap();
        assert_eq!(record.attempt_count(), 1);
        assert_eq!(record.error_kind.as_deref(), Some("Cancelled"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.run.status(), RunStatus::Failed);
    }
}
