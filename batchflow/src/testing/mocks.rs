//! Mock tasks and transports for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::context::TaskContext;
use crate::errors::{BatchflowError, TransportError};
use crate::notify::{Notification, SmtpSettings, Transport};
use crate::tasks::{BranchDecision, Task};

/// A task that records every invocation and publishes fixed results.
#[derive(Debug)]
pub struct RecordingTask {
    name: String,
    results: Vec<(String, serde_json::Value)>,
    attempts: Mutex<Vec<u32>>,
}

impl RecordingTask {
    /// Creates a task that publishes nothing.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: Vec::new(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Adds a result published on every invocation.
    #[must_use]
    pub fn publishing(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.results.push((key.into(), value));
        self
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Returns the attempt number seen by each invocation.
    #[must_use]
    pub fn attempts(&self) -> Vec<u32> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Task for RecordingTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), BatchflowError> {
        self.attempts.lock().push(ctx.attempt());
        for (key, value) in &self.results {
            ctx.publish(key.clone(), value.clone())?;
        }
        Ok(())
    }
}

/// A task that fails a number of times before succeeding.
///
/// Every invocation publishes `attempt` first, so tests can check that a
/// failed attempt's results are discarded.
#[derive(Debug)]
pub struct FailingTask {
    name: String,
    failures: u32,
    fatal: bool,
    calls: AtomicU32,
}

impl FailingTask {
    /// Fails the first `failures` invocations with a retryable error.
    #[must_use]
    pub fn times(name: impl Into<String>, failures: u32) -> Self {
        Self {
            name: name.into(),
            failures,
            fatal: false,
            calls: AtomicU32::new(0),
        }
    }

    /// Fails every invocation with a retryable error.
    #[must_use]
    pub fn always(name: impl Into<String>) -> Self {
        Self::times(name, u32::MAX)
    }

    /// Fails every invocation with an error that is never retried.
    #[must_use]
    pub fn fatal(name: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::always(name)
        }
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for FailingTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), BatchflowError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.publish("attempt", serde_json::json!(call))?;
        if self.fatal {
            return Err(BatchflowError::Config(format!("{} is misconfigured", self.name)));
        }
        if call <= self.failures {
            return Err(BatchflowError::execution(format!(
                "{} failed on call {call}",
                self.name
            )));
        }
        Ok(())
    }
}

/// A branch decision that always selects the same target.
#[derive(Debug)]
pub struct FixedBranch {
    name: String,
    target: String,
}

impl FixedBranch {
    /// Creates a decision selecting `target`.
    #[must_use]
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
        }
    }
}

#[async_trait]
impl BranchDecision for FixedBranch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&self, _ctx: &TaskContext) -> Result<String, BatchflowError> {
        Ok(self.target.clone())
    }
}

/// How a scripted submission ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// The submission is accepted.
    Accept,
    /// The submission fails and may be retried.
    Transient,
    /// The credentials are rejected.
    RejectAuth,
}

/// A transport that plays back a script of outcomes.
///
/// Once the script runs out, the last step repeats. An empty script accepts
/// everything.
#[derive(Debug)]
pub struct ScriptedTransport {
    name: String,
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Scripted>,
    submissions: Mutex<Vec<Notification>>,
}

impl ScriptedTransport {
    /// Creates a transport following `script`.
    #[must_use]
    pub fn new(name: impl Into<String>, script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(Scripted::Accept),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// A transport that accepts everything.
    #[must_use]
    pub fn accepting(name: impl Into<String>) -> Self {
        Self::new(name, [])
    }

    /// A transport that always fails transiently.
    #[must_use]
    pub fn failing(name: impl Into<String>) -> Self {
        Self::new(name, [Scripted::Transient])
    }

    /// Returns every notification submitted, accepted or not.
    #[must_use]
    pub fn submissions(&self) -> Vec<Notification> {
        self.submissions.lock().clone()
    }

    /// Returns the number of submissions.
    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit(
        &self,
        _settings: &SmtpSettings,
        _sender: &str,
        notification: &Notification,
    ) -> Result<(), TransportError> {
        self.submissions.lock().push(notification.clone());
        let step = {
            let mut last = self.last.lock();
            if let Some(next) = self.script.lock().pop_front() {
                *last = next;
            }
            *last
        };
        match step {
            Scripted::Accept => Ok(()),
            Scripted::Transient => Err(TransportError::transient(&self.name, "connection reset")),
            Scripted::RejectAuth => Err(TransportError::auth(&self.name, "535 bad credentials")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResultStore;
    use std::sync::Arc;
    use uuid::Uuid;

    fn ctx(attempt: u32) -> TaskContext {
        TaskContext::new(Uuid::new_v4(), "mock", attempt, Arc::new(ResultStore::new()))
    }

    #[tokio::test]
    async fn test_recording_task() {
        let task = RecordingTask::new("mock").publishing("value", serde_json::json!(1));
        task.execute(&ctx(1)).await.unwrap();
        task.execute(&ctx(2)).await.unwrap();
        assert_eq!(task.attempts(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failing_task_times() {
        let task = FailingTask::times("mock", 1);
        let err = task.execute(&ctx(1)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(task.execute(&ctx(2)).await.is_ok());
        assert_eq!(task.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fatal_task_is_not_retryable() {
        let err = FailingTask::fatal("mock").execute(&ctx(1)).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_scripted_transport_repeats_last_step() {
        let transport = ScriptedTransport::new("smtp", [Scripted::Transient, Scripted::Accept]);
        let settings = SmtpSettings::default();
        let note = Notification::new(vec!["a@example.com".to_string()], "s", "b").unwrap();

        assert!(transport.submit(&settings, "f@example.com", &note).await.is_err());
        assert!(transport.submit(&settings, "f@example.com", &note).await.is_ok());
        assert!(transport.submit(&settings, "f@example.com", &note).await.is_ok());
        assert_eq!(transport.submission_count(), 3);
    }
}
