//! Read side of a packed archive
//!
//! Lookups go through `index.json` to a single chunk, which is decompressed once and
//! cached, the same path a static viewer takes in the browser.

use crate::archive::{chunk_file_name, ChunkIndex, INDEX_FILE_NAME};
use crate::record::{Key, Record};
use crate::{ArchiverError, Result};
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Decompresses one chunk file into its JSON object
pub fn read_chunk(path: &Path) -> Result<Map<String, Value>> {
    let decoder = GzDecoder::new(BufReader::new(File::open(path)?));
    match serde_json::from_reader(decoder) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ArchiverError::CorruptArchive(format!(
            "{} is not a JSON object",
            path.display()
        ))),
        Err(e) => Err(ArchiverError::CorruptArchive(format!(
            "{}: {}",
            path.display(),
            e
        ))),
    }
}

/// Random access to records in a chunk directory
pub struct ArchiveReader {
    dir: PathBuf,
    index: ChunkIndex,
    chunks: HashMap<u32, Map<String, Value>>,
}

impl ArchiveReader {
    /// Opens a chunk directory and loads its index
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let index = ChunkIndex::read_from(&dir.join(INDEX_FILE_NAME))?;
        Ok(Self {
            dir,
            index,
            chunks: HashMap::new(),
        })
    }

    pub fn index(&self) -> &ChunkIndex {
        &self.index
    }

    /// Loads the record for `key`, or None if the archive does not contain it
    pub fn load(&mut self, key: &Key) -> Result<Option<Record>> {
        let Some(chunk_id) = self.index.get(key.as_str()) else {
            return Ok(None);
        };

        if !self.chunks.contains_key(&chunk_id) {
            let path = self.dir.join(chunk_file_name(chunk_id));
            tracing::debug!("Loading chunk {} from {}", chunk_id, path.display());
            self.chunks.insert(chunk_id, read_chunk(&path)?);
        }

        let value = self
            .chunks
            .get(&chunk_id)
            .and_then(|chunk| chunk.get(key.as_str()))
            .ok_or_else(|| {
                ArchiverError::CorruptArchive(format!(
                    "index maps {} to chunk {} but the chunk does not contain it",
                    key, chunk_id
                ))
            })?;

        let record = Record::deserialize(value)
            .map_err(|e| ArchiverError::CorruptArchive(format!("record {}: {}", key, e)))?;
        Ok(Some(record))
    }

    /// Number of chunks decompressed so far
    pub fn cached_chunks(&self) -> usize {
        self.chunks.len()
    }
}
