//! Storage traits and error types
//!
//! This module defines the trait interface for record store backends and
//! associated error types.

use crate::record::{Key, Record};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt value for key {key}: {source}")]
    Serialization {
        key: String,
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Streaming iterator over `(key, record)` pairs in the store's natural order
pub type Entries<'a> = Box<dyn Iterator<Item = StorageResult<(Key, Record)>> + 'a>;

/// Trait for record store implementations
///
/// The store is the system of record for a crawl and its resume checkpoint.
/// Methods take `&self` so one store can be shared between concurrent crawl tasks;
/// implementations serialize writes internally. Writes never race on the same key
/// because the visit tracker hands each key to exactly one task.
pub trait RecordStore: Send + Sync {
    /// Looks up the record stored under `key`
    fn get(&self, key: &Key) -> StorageResult<Option<Record>>;

    /// Inserts or overwrites the record under `key`
    ///
    /// Overwriting keeps the key's original position in iteration order.
    fn put(&self, key: &Key, record: &Record) -> StorageResult<()>;

    /// Returns true if a record exists under `key`
    fn contains(&self, key: &Key) -> StorageResult<bool>;

    /// Number of stored records
    fn len(&self) -> StorageResult<u64>;

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Iterates all entries in a stable order (first-insertion order)
    ///
    /// Implementations must stream rather than materialize the whole store.
    fn entries(&self) -> Entries<'_>;
}
