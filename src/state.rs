//! Cross-suite shared mutable state

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A primitive value that suites may publish into the shared state map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SharedValue {
    /// Boolean flag
    Bool(bool),
    /// Numeric value
    Number(f64),
    /// Text value
    Text(String),
}

impl fmt::Display for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for SharedValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for SharedValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for SharedValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for SharedValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SharedValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Process-wide key/value map of primitive values shared across suites.
///
/// Writes are last-write-wins and are only applied on the orchestrator side
/// as worker messages arrive, so no ordering is guaranteed between writes
/// from concurrently running suites beyond message delivery order. The map
/// is scoped to a single run and never persisted.
#[derive(Debug, Default)]
pub struct SharedState {
    entries: Mutex<BTreeMap<String, SharedValue>>,
}

impl SharedState {
    /// Create an empty shared state map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, overwriting any previous value
    pub fn set(&self, key: impl Into<String>, value: impl Into<SharedValue>) {
        self.entries.lock().unwrap().insert(key.into(), value.into());
    }

    /// Get the current value for a key
    pub fn get(&self, key: &str) -> Option<SharedValue> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    /// Clone the full map, e.g. to seed a newly dispatched worker
    pub fn snapshot(&self) -> BTreeMap<String, SharedValue> {
        self.entries.lock().unwrap().clone()
    }

    /// Number of entries currently stored
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Check whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
