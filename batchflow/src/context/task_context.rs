//! Context handed to a task's unit of work for one attempt.

use super::ResultStore;
use crate::errors::BatchflowError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// The view of a run that a task attempt sees.
///
/// Reads go straight to the run's [`ResultStore`]. Writes are staged on the
/// context and only reach the store when the engine commits a successful
/// attempt, so a retried attempt starts from the same inputs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    run_id: Uuid,
    task: String,
    attempt: u32,
    store: Arc<ResultStore>,
    staged: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

impl TaskContext {
    /// Creates a context for one attempt of `task`.
    #[must_use]
    pub fn new(run_id: Uuid, task: impl Into<String>, attempt: u32, store: Arc<ResultStore>) -> Self {
        Self {
            run_id,
            task: task.into(),
            attempt,
            store,
            staged: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the executing task's name.
    #[must_use]
    pub fn task_name(&self) -> &str {
        &self.task
    }

    /// Returns the attempt number (1-indexed).
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Publishes a result under this task's name.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateResult` if the key was already published by this
    /// task, either committed or staged in this attempt.
    pub fn publish(&self, key: impl Into<String>, value: serde_json::Value) -> Result<(), BatchflowError> {
        let key = key.into();
        let mut staged = self.staged.lock();

        if self.store.contains(&self.task, &key) || staged.iter().any(|(k, _)| *k == key) {
            return Err(BatchflowError::duplicate_result(&self.task, key));
        }

        staged.push((key, value));
        Ok(())
    }

    /// Serializes and publishes a result.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` or `DuplicateResult`.
    pub fn publish_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<(), BatchflowError> {
        self.publish(key, serde_json::to_value(value)?)
    }

    /// Fetches a result published by an upstream task.
    ///
    /// # Errors
    ///
    /// Returns `MissingResult` if it has not been published.
    pub fn fetch(&self, task: &str, key: &str) -> Result<serde_json::Value, BatchflowError> {
        self.store.fetch(task, key)
    }

    /// Fetches `key` from whichever of `tasks` published it first.
    ///
    /// # Errors
    ///
    /// Returns `MissingResult` if none did.
    pub fn fetch_many<S: AsRef<str>>(&self, tasks: &[S], key: &str) -> Result<serde_json::Value, BatchflowError> {
        self.store.fetch_many(tasks, key)
    }

    /// Typed variant of [`TaskContext::fetch`].
    ///
    /// # Errors
    ///
    /// Returns `MissingResult` or `Serialization`.
    pub fn fetch_as<T: DeserializeOwned>(&self, task: &str, key: &str) -> Result<T, BatchflowError> {
        self.store.fetch_as(task, key)
    }

    /// Typed variant of [`TaskContext::fetch_many`].
    ///
    /// # Errors
    ///
    /// Returns `MissingResult` or `Serialization`.
    pub fn fetch_many_as<T: DeserializeOwned, S: AsRef<str>>(&self, tasks: &[S], key: &str) -> Result<T, BatchflowError> {
        self.store.fetch_many_as(tasks, key)
    }

    /// Number of results staged by this attempt.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.lock().len()
    }

    /// Returns the value this attempt staged under `key`, if any.
    pub(crate) fn staged_value(&self, key: &str) -> Option<serde_json::Value> {
        self.staged
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Moves this attempt's staged results into the store.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateResult` if any key was published in the meantime.
    pub(crate) fn commit(&self) -> Result<(), BatchflowError> {
        let staged = std::mem::take(&mut *self.staged.lock());
        if staged.is_empty() {
            return Ok(());
        }
        self.store.commit(&self.task, staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(store: &Arc<ResultStore>, attempt: u32) -> TaskContext {
        TaskContext::new(Uuid::new_v4(), "analyze_data", attempt, store.clone())
    }

    #[test]
    fn test_publish_is_staged_until_commit() {
        let store = Arc::new(ResultStore::new());
        let ctx = ctx(&store, 1);
        ctx.publish("analysis_results", json!({"high_earners": 4})).unwrap();

        assert!(!store.contains("analyze_data", "analysis_results"));
        ctx.commit().unwrap();
        assert!(store.contains("analyze_data", "analysis_results"));
        assert_eq!(ctx.staged_len(), 0);
    }

    #[test]
    fn test_discarded_attempt_allows_republish() {
        let store = Arc::new(ResultStore::new());
        let first = ctx(&store, 1);
        first.publish("analysis_results", json!(1)).unwrap();
        drop(first);

        let second = ctx(&store, 2);
        second.publish("analysis_results", json!(2)).unwrap();
        second.commit().unwrap();
        assert_eq!(store.fetch("analyze_data", "analysis_results").unwrap(), json!(2));
    }

    #[test]
    fn test_duplicate_within_attempt() {
        let store = Arc::new(ResultStore::new());
        let ctx = ctx(&store, 1);
        ctx.publish("k", json!(1)).unwrap();
        assert!(matches!(
            ctx.publish("k", json!(2)),
            Err(BatchflowError::DuplicateResult { .. })
        ));
    }

    #[test]
    fn test_duplicate_of_committed_result() {
        let store = Arc::new(ResultStore::new());
        store.publish("analyze_data", "k", json!(1)).unwrap();
        let ctx = ctx(&store, 1);
        assert!(ctx.publish("k", json!(2)).is_err());
    }

    #[test]
    fn test_reads_go_to_store() {
        let store = Arc::new(ResultStore::new());
        store.publish("read_data", "data_info", json!({"row_count": 3})).unwrap();
        let ctx = ctx(&store, 1);

        assert_eq!(ctx.fetch("read_data", "data_info").unwrap()["row_count"], 3);
        assert!(ctx.fetch("read_data", "missing").is_err());
        assert_eq!(ctx.task_name(), "analyze_data");
        assert_eq!(ctx.attempt(), 1);
    }
}
