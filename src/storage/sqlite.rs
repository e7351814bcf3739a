//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the RecordStore trait,
//! plus the crawl run bookkeeping used by the command-line front end.

use crate::record::{Key, Record};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Entries, RecordStore, StorageError, StorageResult};
use crate::storage::{RecordCounts, RunRecord, RunStatus};
use crate::ArchiverError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Rows fetched per round trip when streaming entries
const ENTRY_PAGE_SIZE: i64 = 256;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(ArchiverError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, ArchiverError> {
        let conn = Connection::open(path).map_err(StorageError::from)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )
        .map_err(StorageError::from)?;

        initialize_schema(&conn).map_err(StorageError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, ArchiverError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        initialize_schema(&conn).map_err(StorageError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }

    // ===== Run Management =====

    /// Creates a new crawl run in the running state
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    pub fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Marks a run finished with the given terminal status
    pub fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn()?.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    /// Gets all runs, oldest first
    pub fn list_runs(&self) -> StorageResult<Vec<RunRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id",
        )?;

        let runs = stmt
            .query_map([], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    config_hash: row.get(3)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(RunStatus::Failed),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    /// Gets the most recent run
    pub fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                            .unwrap_or(RunStatus::Failed),
                    })
                },
            )
            .optional()?;

        Ok(run)
    }

    // ===== Statistics =====

    /// Counts forum records, topic records and archived posts
    pub fn record_counts(&self) -> StorageResult<RecordCounts> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT json_extract(value, '$.kind'), COUNT(*), SUM(json_array_length(value, '$.items'))
             FROM records GROUP BY 1",
        )?;

        let mut counts = RecordCounts::default();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        })?;

        for row in rows {
            let (kind, records, items) = row?;
            match kind.as_deref() {
                Some("forum") => counts.forums += records as u64,
                Some("topic") => {
                    counts.topics += records as u64;
                    counts.posts += items.unwrap_or(0) as u64;
                }
                _ => counts.other += records as u64,
            }
        }

        Ok(counts)
    }

    /// Loads up to one page of raw rows after `after_rowid`
    fn load_page(&self, after_rowid: i64) -> StorageResult<Vec<(i64, String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT rowid, key, value FROM records WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![after_rowid, ENTRY_PAGE_SIZE], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

fn decode_value(key: &str, value: &str) -> StorageResult<Record> {
    serde_json::from_str(value).map_err(|source| StorageError::Serialization {
        key: key.to_string(),
        source,
    })
}

impl RecordStore for SqliteStorage {
    fn get(&self, key: &Key) -> StorageResult<Option<Record>> {
        let value: Option<String> = self
            .conn()?
            .query_row(
                "SELECT value FROM records WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        value
            .map(|value| decode_value(key.as_str(), &value))
            .transpose()
    }

    fn put(&self, key: &Key, record: &Record) -> StorageResult<()> {
        let value = serde_json::to_string(record).map_err(|source| StorageError::Serialization {
            key: key.to_string(),
            source,
        })?;

        // Upsert rather than REPLACE so an overwritten key keeps its rowid
        self.conn()?.execute(
            "INSERT INTO records (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key.as_str(), value],
        )?;
        Ok(())
    }

    fn contains(&self, key: &Key) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM records WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn len(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn entries(&self) -> Entries<'_> {
        Box::new(SqliteEntries {
            storage: self,
            last_rowid: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }
}

/// Keyset-paginated cursor over the records table
///
/// The connection lock is only held while a page is loaded, so the store stays
/// usable between pages.
struct SqliteEntries<'a> {
    storage: &'a SqliteStorage,
    last_rowid: i64,
    buffer: VecDeque<(i64, String, String)>,
    exhausted: bool,
}

impl Iterator for SqliteEntries<'_> {
    type Item = StorageResult<(Key, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.storage.load_page(self.last_rowid) {
                Ok(rows) => {
                    self.exhausted = (rows.len() as i64) < ENTRY_PAGE_SIZE;
                    self.buffer.extend(rows);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        let (rowid, key, value) = self.buffer.pop_front()?;
        self.last_rowid = rowid;
        Some(decode_value(&key, &value).map(|record| (Key::from_raw(key), record)))
    }
}
