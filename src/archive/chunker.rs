//! Streaming chunk encoder
//!
//! Entries are written straight into a compressor as `"key":value` pairs of one JSON
//! object. After every entry the encoder asks the compressor how many bytes it has
//! already flushed; once that reaches the threshold the object is closed and the chunk
//! is sealed.
//!
//! The probe sees only what has left the compressor's internal buffer, so a sealed
//! chunk usually ends up somewhat larger than the threshold. Chunk boundaries of
//! existing archives depend on this, so it must stay a lower-bound probe.

use crate::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::io::{self, Write};

/// A compressor that can report its output progress mid-stream
pub trait ChunkCompressor: Write {
    /// Compressed bytes emitted so far; lags the final size until `finish`
    fn bytes_flushed(&self) -> usize;

    /// Flushes remaining state and returns the complete compressed blob
    fn finish(self) -> io::Result<Vec<u8>>;
}

impl ChunkCompressor for GzEncoder<Vec<u8>> {
    fn bytes_flushed(&self) -> usize {
        self.get_ref().len()
    }

    fn finish(self) -> io::Result<Vec<u8>> {
        GzEncoder::finish(self)
    }
}

/// Builds the gzip compressor used for published archives
pub fn gzip_compressor() -> GzEncoder<Vec<u8>> {
    GzEncoder::new(Vec::new(), Compression::best())
}

/// One sealed chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Sequential id, starting at 0
    pub id: u32,
    /// Number of entries in the chunk
    pub entries: usize,
    /// Compressed JSON object
    pub bytes: Vec<u8>,
}

/// Packs `"key":value` entries into size-bounded compressed JSON objects
pub struct ChunkEncoder<C, F> {
    new_compressor: F,
    current: C,
    threshold: usize,
    next_id: u32,
    entries: usize,
}

impl<C, F> ChunkEncoder<C, F>
where
    C: ChunkCompressor,
    F: FnMut() -> C,
{
    /// Creates an encoder that seals a chunk once `threshold` compressed bytes
    /// have been flushed
    pub fn new(threshold: usize, mut new_compressor: F) -> Self {
        let current = new_compressor();
        Self {
            new_compressor,
            current,
            threshold,
            next_id: 0,
            entries: 0,
        }
    }

    /// Id of the chunk the next pushed entry will land in
    pub fn current_id(&self) -> u32 {
        self.next_id
    }

    /// Appends one entry, returning the chunk it sealed, if any
    pub fn push<V>(&mut self, key: &str, value: &V) -> Result<Option<Chunk>>
    where
        V: Serialize + ?Sized,
    {
        let separator: &[u8] = if self.entries == 0 { b"{" } else { b"," };
        self.current.write_all(separator)?;
        serde_json::to_writer(&mut self.current, key)?;
        self.current.write_all(b":")?;
        serde_json::to_writer(&mut self.current, value)?;
        self.entries += 1;

        if self.current.bytes_flushed() >= self.threshold {
            let fresh = (self.new_compressor)();
            let full = std::mem::replace(&mut self.current, fresh);
            return self.seal(full).map(Some);
        }

        Ok(None)
    }

    /// Seals the trailing chunk if it received any entries
    pub fn finish(mut self) -> Result<Option<Chunk>> {
        if self.entries == 0 {
            return Ok(None);
        }
        let fresh = (self.new_compressor)();
        let last = std::mem::replace(&mut self.current, fresh);
        self.seal(last).map(Some)
    }

    fn seal(&mut self, mut compressor: C) -> Result<Chunk> {
        compressor.write_all(b"}")?;
        let chunk = Chunk {
            id: self.next_id,
            entries: self.entries,
            bytes: compressor.finish()?,
        };
        self.next_id += 1;
        self.entries = 0;
        Ok(chunk)
    }
}
