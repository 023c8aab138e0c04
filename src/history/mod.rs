//! Revision history of analyzed problems
//!
//! The whole history is one JSON array, newest first, stored under a single
//! fixed key. Entries are never edited: the list only grows by prepending or
//! is cleared wholesale.
//!
//! Appends are read-modify-write. Two processes appending at the same time
//! can overwrite each other's latest entry; this is a known limitation.

use crate::config::HistoryConfig;
use crate::error::{ExamSnapError, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::Arc;

pub mod kv;
pub mod types;

pub use kv::{DisabledStore, KeyValueStore, MemoryStore, SledStore};
pub use types::AnalyzedProblem;

/// Key the history blob is stored under
pub const HISTORY_KEY: &str = "examsnap.history";

/// Handle to the persisted history
///
/// Cheap to clone; clones share the underlying store.
#[derive(Clone)]
pub struct HistoryStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl HistoryStore {
    /// Wraps a key-value store, using the fixed [`HISTORY_KEY`] namespace
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            key: HISTORY_KEY.to_string(),
        }
    }

    /// In-memory history, mostly for tests and one-shot runs
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// History that never persists anything
    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledStore))
    }

    /// Opens the history described by the configuration
    ///
    /// Uses `config.path` when set, otherwise the platform data directory.
    /// A disabled history yields a [`DisabledStore`].
    ///
    /// # Errors
    ///
    /// Returns `ExamSnapError::Storage` if the data directory cannot be
    /// determined or the database cannot be opened.
    pub fn open(config: &HistoryConfig) -> Result<Self> {
        if !config.enabled {
            tracing::info!("History persistence disabled by configuration");
            return Ok(Self::disabled());
        }

        let path = match &config.path {
            Some(path) => PathBuf::from(path),
            None => default_history_path()?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ExamSnapError::Storage(format!("Failed to create data directory: {}", e))
            })?;
        }

        tracing::debug!("Opening history store at {}", path.display());
        Ok(Self::new(Arc::new(SledStore::open(&path)?)))
    }

    /// Returns every stored problem, newest first
    ///
    /// An absent, unreadable or corrupt blob (including valid JSON that is
    /// not an array of problems) reads as an empty history.
    pub fn read_all(&self) -> Vec<AnalyzedProblem> {
        let bytes = match self.kv.get(&self.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read history: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<AnalyzedProblem>>(&bytes) {
            Ok(problems) => problems,
            Err(e) => {
                tracing::warn!("Ignoring corrupt history blob: {}", e);
                Vec::new()
            }
        }
    }

    /// Prepends `problem` and persists the new list
    ///
    /// Returns the updated list. When the write fails the failure is logged
    /// and the prior list is returned unchanged.
    pub fn append(&self, problem: &AnalyzedProblem) -> Vec<AnalyzedProblem> {
        let prior = self.read_all();

        let mut updated = Vec::with_capacity(prior.len() + 1);
        updated.push(problem.clone());
        updated.extend(prior.iter().cloned());

        let write = serde_json::to_vec(&updated)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| self.kv.set(&self.key, &bytes));

        match write {
            Ok(()) => {
                tracing::debug!(
                    "Saved problem {} to history ({} entries)",
                    problem.id,
                    updated.len()
                );
                updated
            }
            Err(e) => {
                tracing::warn!("Failed to save problem {} to history: {}", problem.id, e);
                prior
            }
        }
    }

    /// Removes all stored history; calling it on an empty history is fine
    ///
    /// # Errors
    ///
    /// Returns the storage error if the key cannot be removed.
    pub fn clear_all(&self) -> Result<()> {
        self.kv.remove(&self.key)?;
        tracing::info!("History cleared");
        Ok(())
    }

    /// Finds a problem by full id or unique id prefix
    pub fn find(&self, id: &str) -> Option<AnalyzedProblem> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        let mut matches = self
            .read_all()
            .into_iter()
            .filter(|p| p.id == id || p.id.starts_with(id));
        let first = matches.next()?;
        if first.id != id && matches.next().is_some() {
            return None;
        }
        Some(first)
    }
}

fn default_history_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "examsnap", "examsnap")
        .ok_or_else(|| ExamSnapError::Storage("Could not determine data directory".into()))?;
    Ok(proj_dirs.data_dir().join("history.sled"))
}
