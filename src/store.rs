//! Resumable result store: in-memory and disk-backed modes

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::result::{ExecutionResult, ResultKey};

/// Errors from the disk-backed result store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error reading or writing the snapshot file
    #[error("result store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization error
    #[error("result store serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key/value map from (lane, suite) to the last execution result.
///
/// `set`, `delete`, and `clear` on the disk-backed mode persist the whole
/// map after the mutation, so the file and the in-memory map always agree
/// once a call returns.
pub trait ResultStore: Send {
    /// Look up the result for a key
    fn get(&self, key: &ResultKey) -> Option<ExecutionResult>;

    /// Store a result, overwriting any previous entry
    fn set(&mut self, key: ResultKey, result: ExecutionResult) -> Result<(), StoreError>;

    /// Remove an entry, returning whether it existed
    fn delete(&mut self, key: &ResultKey) -> Result<bool, StoreError>;

    /// Remove every entry
    fn clear(&mut self) -> Result<(), StoreError>;

    /// All stored results
    fn values(&self) -> Vec<ExecutionResult>;

    /// Number of stored results
    fn len(&self) -> usize;

    /// Check whether the store is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory result store, cleared each run
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    entries: BTreeMap<String, ExecutionResult>,
}

impl MemoryResultStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryResultStore {
    fn get(&self, key: &ResultKey) -> Option<ExecutionResult> {
        self.entries.get(&key.to_string()).cloned()
    }

    fn set(&mut self, key: ResultKey, result: ExecutionResult) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), result);
        Ok(())
    }

    fn delete(&mut self, key: &ResultKey) -> Result<bool, StoreError> {
        Ok(self.entries.remove(&key.to_string()).is_some())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }

    fn values(&self) -> Vec<ExecutionResult> {
        self.entries.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Disk-backed result store.
///
/// The file holds a JSON object keyed by `"{lane}:{suite}"`. It is loaded
/// verbatim at open (a missing file is an empty cache) and rewritten in full
/// after every mutation, which is what lets a later run skip suites that
/// already succeeded.
#[derive(Debug)]
pub struct DiskResultStore {
    entries: BTreeMap<String, ExecutionResult>,
    location: PathBuf,
}

impl DiskResultStore {
    /// Open the store at the given location, loading any existing snapshot
    pub fn open(location: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let location = location.into();

        if let Some(parent) = location.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let entries = if location.exists() {
            let contents = fs::read_to_string(&location)?;
            serde_json::from_str(&contents)?
        } else {
            BTreeMap::new()
        };

        info!(
            location = %location.display(),
            entries = entries.len(),
            "opened resumable result store"
        );

        let store = Self { entries, location };
        store.flush()?;
        Ok(store)
    }

    /// Path of the snapshot file
    pub fn location(&self) -> &Path {
        &self.location
    }

    fn flush(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.location, json)?;
        debug!(
            location = %self.location.display(),
            entries = self.entries.len(),
            "flushed result store snapshot"
        );
        Ok(())
    }
}

impl ResultStore for DiskResultStore {
    fn get(&self, key: &ResultKey) -> Option<ExecutionResult> {
        self.entries.get(&key.to_string()).cloned()
    }

    fn set(&mut self, key: ResultKey, result: ExecutionResult) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), result);
        self.flush()
    }

    fn delete(&mut self, key: &ResultKey) -> Result<bool, StoreError> {
        let existed = self.entries.remove(&key.to_string()).is_some();
        self.flush()?;
        Ok(existed)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        self.flush()
    }

    fn values(&self) -> Vec<ExecutionResult> {
        self.entries.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::result::StepResult;

    fn result_for(suite: &str) -> ExecutionResult {
        ExecutionResult::finished(
            suite,
            Duration::from_millis(10),
            vec![StepResult::passed("main", Duration::from_millis(10))],
            "null".to_string(),
        )
    }

    fn read_snapshot(path: &Path) -> BTreeMap<String, ExecutionResult> {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryResultStore::new();
        let key = ResultKey::new("staging", "login");

        store.set(key.clone(), result_for("login")).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(&key).unwrap().success);

        assert!(store.delete(&key).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_disk_store_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("resume.json");

        let store = DiskResultStore::open(&path).unwrap();
        assert!(store.is_empty());
        // open() writes an initial snapshot even for an empty cache
        assert!(path.exists());
    }

    #[test]
    fn test_disk_store_snapshot_matches_after_every_mutation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("resume.json");
        let mut store = DiskResultStore::open(&path).unwrap();

        let login = ResultKey::new("staging", "login");
        let checkout = ResultKey::new("staging", "checkout");

        store.set(login.clone(), result_for("login")).unwrap();
        store.set(checkout.clone(), result_for("checkout")).unwrap();
        assert_eq!(read_snapshot(&path).len(), 2);

        store.delete(&login).unwrap();
        let snapshot = read_snapshot(&path);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("staging:checkout"));

        store.clear().unwrap();
        assert!(read_snapshot(&path).is_empty());
    }

    #[test]
    fn test_disk_store_reloads_persisted_entries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("resume.json");

        {
            let mut store = DiskResultStore::open(&path).unwrap();
            store
                .set(ResultKey::new("staging", "login"), result_for("login"))
                .unwrap();
        }

        let reopened = DiskResultStore::open(&path).unwrap();
        let cached = reopened.get(&ResultKey::new("staging", "login")).unwrap();
        assert_eq!(cached.suite_name, "login");
        assert!(cached.success);
    }

    #[test]
    fn test_lanes_never_collide() {
        let mut store = MemoryResultStore::new();
        store
            .set(ResultKey::new("staging", "login"), result_for("login"))
            .unwrap();

        assert!(store.get(&ResultKey::new("production", "login")).is_none());
    }
}
