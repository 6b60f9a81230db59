//! Run-scoped result store.

use crate::errors::BatchflowError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// A thread-safe, write-once store for inter-task results.
///
/// Entries are addressed by (producer task, result key). Publishing to an
/// existing address raises `DuplicateResult`; fetching an unpublished one
/// raises `MissingResult`.
#[derive(Debug, Default)]
pub struct ResultStore {
    entries: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
}

impl ResultStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a value under (task, key).
    ///
    /// # Errors
    ///
    /// Returns `DuplicateResult` if the address is already taken.
    pub fn publish(
        &self,
        task: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), BatchflowError> {
        let task = task.into();
        let key = key.into();
        let mut entries = self.entries.write();
        let slot = entries.entry(task.clone()).or_default();

        if slot.contains_key(&key) {
            return Err(BatchflowError::duplicate_result(task, key));
        }

        slot.insert(key, value);
        Ok(())
    }

    /// Publishes a batch of values for one task atomically.
    ///
    /// Either every entry is written or none is.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateResult` for the first key that is already taken.
    pub fn commit(
        &self,
        task: &str,
        values: Vec<(String, serde_json::Value)>,
    ) -> Result<(), BatchflowError> {
        let mut entries = self.entries.write();

        if let Some(existing) = entries.get(task) {
            if let Some((key, _)) = values.iter().find(|(key, _)| existing.contains_key(key)) {
                return Err(BatchflowError::duplicate_result(task, key.clone()));
            }
        }

        let slot = entries.entry(task.to_string()).or_default();
        for (key, value) in values {
            slot.insert(key, value);
        }
        Ok(())
    }

    /// Fetches the value published under (task, key).
    ///
    /// # Errors
    ///
    /// Returns `MissingResult` if nothing was published there.
    pub fn fetch(&self, task: &str, key: &str) -> Result<serde_json::Value, BatchflowError> {
        self.entries
            .read()
            .get(task)
            .and_then(|slot| slot.get(key))
            .cloned()
            .ok_or_else(|| BatchflowError::missing_result(&[task], key))
    }

    /// Fetches `key` from the first of `tasks` that published it.
    ///
    /// Join points use this to read whichever sibling branch actually ran.
    ///
    /// # Errors
    ///
    /// Returns `MissingResult` if none of the tasks published the key.
    pub fn fetch_many<S: AsRef<str>>(
        &self,
        tasks: &[S],
        key: &str,
    ) -> Result<serde_json::Value, BatchflowError> {
        let entries = self.entries.read();
        tasks
            .iter()
            .find_map(|task| entries.get(task.as_ref()).and_then(|slot| slot.get(key)))
            .cloned()
            .ok_or_else(|| BatchflowError::missing_result(tasks, key))
    }

    /// Fetches and deserializes a value.
    ///
    /// # Errors
    ///
    /// Returns `MissingResult`, or `Serialization` if the value has another shape.
    pub fn fetch_as<T: DeserializeOwned>(&self, task: &str, key: &str) -> Result<T, BatchflowError> {
        Ok(serde_json::from_value(self.fetch(task, key)?)?)
    }

    /// Typed variant of [`ResultStore::fetch_many`].
    ///
    /// # Errors
    ///
    /// Returns `MissingResult`, or `Serialization` if the value has another shape.
    pub fn fetch_many_as<T: DeserializeOwned, S: AsRef<str>>(
        &self,
        tasks: &[S],
        key: &str,
    ) -> Result<T, BatchflowError> {
        Ok(serde_json::from_value(self.fetch_many(tasks, key)?)?)
    }

    /// Checks if (task, key) has been published.
    #[must_use]
    pub fn contains(&self, task: &str, key: &str) -> bool {
        self.entries
            .read()
            .get(task)
            .is_some_and(|slot| slot.contains_key(key))
    }

    /// Returns the keys a task has published.
    #[must_use]
    pub fn keys(&self, task: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .get(task)
            .map(|slot| slot.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Returns the total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().values().map(HashMap::len).sum()
    }

    /// Returns true if nothing has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
