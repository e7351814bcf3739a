//! In-memory record store
//!
//! Keeps first-insertion order like the SQLite backend and counts writes per key,
//! which makes it handy for exercising the crawler without a database file.

use crate::record::{Key, Record};
use crate::storage::traits::{Entries, RecordStore, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    order: Vec<Key>,
    records: HashMap<Key, Record>,
    writes: HashMap<Key, usize>,
}

/// Thread-safe, non-durable record store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Database("memory store lock poisoned".to_string()))
    }

    /// Number of times `key` has been written
    pub fn write_count(&self, key: &Key) -> usize {
        self.lock()
            .map(|inner| inner.writes.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Keys in first-write order
    pub fn keys(&self) -> Vec<Key> {
        self.lock()
            .map(|inner| inner.order.clone())
            .unwrap_or_default()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, key: &Key) -> StorageResult<Option<Record>> {
        Ok(self.lock()?.records.get(key).cloned())
    }

    fn put(&self, key: &Key, record: &Record) -> StorageResult<()> {
        let mut inner = self.lock()?;
        if inner.records.insert(key.clone(), record.clone()).is_none() {
            inner.order.push(key.clone());
        }
        *inner.writes.entry(key.clone()).or_insert(0) += 1;
        Ok(())
    }

    fn contains(&self, key: &Key) -> StorageResult<bool> {
        Ok(self.lock()?.records.contains_key(key))
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.lock()?.records.len() as u64)
    }

    fn entries(&self) -> Entries<'_> {
        // Snapshot the key order, then look each record up lazily
        let keys = self.keys();
        Box::new(keys.into_iter().filter_map(move |key| {
            match self.get(&key) {
                Ok(Some(record)) => Some(Ok((key, record))),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        }))
    }
}
