// ABOUTME: Provenance-tracked key/value container shared by all tasks of a run
// ABOUTME: Records the names of tasks that touched the data in execution order

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Data threaded through a workflow run.
///
/// `Clone` produces a deep, independent copy: neither the mapping nor the
/// history of the copy alias the original.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskData {
    #[serde(default)]
    values: IndexMap<String, Value>,
    #[serde(default)]
    history: Vec<String>,
}

impl TaskData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the data with initial values and an existing task history.
    pub fn from_parts<I, K, V, H>(values: I, history: H) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
        H: IntoIterator,
        H::Item: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            history: history.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a task name to the provenance history.
    pub fn add_task_history(&mut self, name: impl Into<String>) {
        self.history.push(name.into());
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.values.get_mut(key)
    }

    /// Deserialize a value into a concrete type.
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> serde_json::Result<Option<T>> {
        self.values
            .get(key)
            .map(|value| T::deserialize(value))
            .transpose()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
