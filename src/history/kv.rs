//! Key-value storage backends for the history blob
//!
//! The history is persisted as one opaque blob under a fixed key, so the
//! only storage capability required is get/set/remove of byte values.

use crate::error::{ExamSnapError, Result};
use sled::Db;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Minimal byte-oriented key-value store
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replaces the value stored under `key`
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Removes `key`; removing an absent key succeeds
    fn remove(&self, key: &str) -> Result<()>;
}

/// On-disk store backed by an embedded `sled` database
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Open or create a store at `path`
    ///
    /// # Errors
    ///
    /// Returns `ExamSnapError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use examsnap::history::SledStore;
    ///
    /// # fn main() -> examsnap::error::Result<()> {
    /// let dir = std::env::temp_dir().join(format!("examsnap-doc-{}", std::process::id()));
    /// let store = SledStore::open(&dir)?;
    /// # drop(store);
    /// # let _ = std::fs::remove_dir_all(&dir);
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| ExamSnapError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| ExamSnapError::Storage(format!("Get failed: {}", e)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| ExamSnapError::Storage(format!("Insert failed: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| ExamSnapError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| ExamSnapError::Storage(format!("Remove failed: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| ExamSnapError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

/// Process-local store; contents vanish with the process
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Store for environments without persistence
///
/// Reads always find nothing and writes are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledStore;

impl KeyValueStore for DisabledStore {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn set(&self, key: &str, _value: &[u8]) -> Result<()> {
        tracing::debug!("History persistence disabled, dropping write to {}", key);
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_dir;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", b"one").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"one".to_vec()));
        store.set("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"two".to_vec()));
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_memory_store_get_set_remove() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sled_store_get_set_remove() {
        let dir = temp_dir();
        let store = SledStore::open(dir.path().join("history.sled")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_sled_store_persists_across_reopen() {
        let dir = temp_dir();
        let path = dir.path().join("history.sled");
        {
            let store = SledStore::open(&path).unwrap();
            store.set("k", b"kept").unwrap();
        }
        let store = SledStore::open(&path).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"kept".to_vec()));
    }

    #[test]
    fn test_disabled_store_drops_writes() {
        let store = DisabledStore;
        store.set("k", b"lost").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
