//! Key index and the lock-step chunk stream that builds it

use crate::archive::chunker::{Chunk, ChunkCompressor, ChunkEncoder};
use crate::{ArchiverError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Mapping from every archived key to the id of the chunk holding it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkIndex {
    entries: BTreeMap<String, u32>,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, chunk_id: u32) {
        self.entries.insert(key.into(), chunk_id);
    }

    /// Chunk id holding `key`
    pub fn get(&self, key: &str) -> Option<u32> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct chunks referenced, assuming contiguous ids
    pub fn chunk_count(&self) -> u32 {
        self.entries.values().max().map_or(0, |max| max + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(key, id)| (key.as_str(), *id))
    }

    /// Writes the index as a single JSON object
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads an index written by [`ChunkIndex::write_to`]
    pub fn read_from(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(|e| {
            ArchiverError::CorruptArchive(format!("{}: {}", path.display(), e))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    Drained,
    Failed,
}

/// Drives a [`ChunkEncoder`] over an entry iterator and records the key index
///
/// Iterating yields sealed chunks in id order. Each key is attributed to the
/// encoder's current chunk before it is pushed, so the entry that seals a chunk
/// belongs to that chunk. The index is released by [`ChunkStream::into_index`]
/// only after the stream has been fully drained without error.
pub struct ChunkStream<I, C, F> {
    entries: I,
    encoder: Option<ChunkEncoder<C, F>>,
    index: ChunkIndex,
    state: StreamState,
}

impl<I, K, V, E, C, F> ChunkStream<I, C, F>
where
    I: Iterator<Item = std::result::Result<(K, V), E>>,
    K: AsRef<str>,
    V: Serialize,
    E: Into<ArchiverError>,
    C: ChunkCompressor,
    F: FnMut() -> C,
{
    pub fn new(entries: I, encoder: ChunkEncoder<C, F>) -> Self {
        Self {
            entries,
            encoder: Some(encoder),
            index: ChunkIndex::new(),
            state: StreamState::Streaming,
        }
    }

    /// Returns the completed index, or None if the stream was not drained cleanly
    pub fn into_index(self) -> Option<ChunkIndex> {
        match self.state {
            StreamState::Drained => Some(self.index),
            StreamState::Streaming | StreamState::Failed => None,
        }
    }

    fn fail(&mut self, error: ArchiverError) -> Option<Result<Chunk>> {
        self.state = StreamState::Failed;
        self.encoder = None;
        Some(Err(error))
    }
}

impl<I, K, V, E, C, F> Iterator for ChunkStream<I, C, F>
where
    I: Iterator<Item = std::result::Result<(K, V), E>>,
    K: AsRef<str>,
    V: Serialize,
    E: Into<ArchiverError>,
    C: ChunkCompressor,
    F: FnMut() -> C,
{
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != StreamState::Streaming {
            return None;
        }

        loop {
            let encoder = self.encoder.as_mut()?;
            match self.entries.next() {
                Some(Ok((key, value))) => {
                    let key = key.as_ref();
                    self.index.insert(key, encoder.current_id());
                    match encoder.push(key, &value) {
                        Ok(Some(chunk)) => return Some(Ok(chunk)),
                        Ok(None) => continue,
                        Err(e) => return self.fail(e),
                    }
                }
                Some(Err(e)) => return self.fail(e.into()),
                None => {
                    let encoder = self.encoder.take()?;
                    return match encoder.finish() {
                        Ok(last) => {
                            self.state = StreamState::Drained;
                            last.map(Ok)
                        }
                        Err(e) => self.fail(e),
                    };
                }
            }
        }
    }
}
