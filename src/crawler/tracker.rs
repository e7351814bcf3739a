//! Visit tracking across the in-process crawl and previous runs

use crate::record::Key;
use crate::storage::{RecordStore, StorageError};
use crate::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Decides whether a key still needs work
///
/// A key is claimable when no task in this run has claimed it and the store
/// does not already hold its record.
pub struct VisitTracker {
    claimed: Mutex<HashSet<Key>>,
    store: Arc<dyn RecordStore>,
}

impl VisitTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            claimed: Mutex::new(HashSet::new()),
            store,
        }
    }

    /// Claims `key` for the calling task
    ///
    /// Returns true exactly once per key per run, and never for a key that is
    /// already persisted. The claimed-set check and insert happen under one lock.
    pub fn claim(&self, key: &Key) -> Result<bool> {
        let mut claimed = self
            .claimed
            .lock()
            .map_err(|e| StorageError::Database(format!("visit tracker poisoned: {}", e)))?;

        if claimed.contains(key) {
            return Ok(false);
        }
        if self.store.contains(key)? {
            tracing::debug!("Skipping {}, already archived", key);
            return Ok(false);
        }

        claimed.insert(key.clone());
        Ok(true)
    }

    /// Number of keys claimed this run
    pub fn claimed_count(&self) -> usize {
        self.claimed.lock().map(|set| set.len()).unwrap_or(0)
    }
}
