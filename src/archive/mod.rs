//! Archive packing
//!
//! This module turns a completed record store into a static archive:
//! - `<id>.json.gz` chunks, each a gzip-compressed JSON object of consecutive records
//! - `index.json`, mapping every key to its chunk id
//!
//! Packing always regenerates the whole directory. Output is staged next to the target
//! and only swapped in once every chunk and the index have been written, so a failed
//! pass never leaves a half-written archive behind.

mod chunker;
mod index;
mod reader;

pub use chunker::{gzip_compressor, Chunk, ChunkCompressor, ChunkEncoder};
pub use index::{ChunkIndex, ChunkStream};
pub use reader::{read_chunk, ArchiveReader};

use crate::storage::RecordStore;
use crate::{ArchiverError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the key index inside a chunk directory
pub const INDEX_FILE_NAME: &str = "index.json";

/// File name of chunk `id` inside a chunk directory
pub fn chunk_file_name(id: u32) -> String {
    format!("{}.json.gz", id)
}

/// Outcome of a pack pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackSummary {
    /// Records written across all chunks
    pub records: usize,
    /// Number of chunk files
    pub chunks: u32,
    /// Total compressed bytes across all chunks
    pub bytes: u64,
}

/// Packs every record in `store` into `dir`, replacing any previous archive there
///
/// # Arguments
///
/// * `store` - The record store to read, in its natural iteration order
/// * `dir` - The chunk directory to (re)create
/// * `chunk_size` - Target compressed size per chunk; chunks may overshoot it
///
/// # Returns
///
/// * `Ok(PackSummary)` - The archive was written and swapped into place
/// * `Err(ArchiverError)` - Packing failed; `dir` is left untouched
pub fn pack_store(store: &dyn RecordStore, dir: &Path, chunk_size: usize) -> Result<PackSummary> {
    let staging = staging_dir(dir)?;
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    match write_archive(store, &staging, chunk_size) {
        Ok(summary) => {
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
            fs::rename(&staging, dir)?;
            tracing::info!(
                "Packed {} records into {} chunks ({} bytes) at {}",
                summary.records,
                summary.chunks,
                summary.bytes,
                dir.display()
            );
            Ok(summary)
        }
        Err(e) => {
            tracing::error!("Packing failed, discarding {}: {}", staging.display(), e);
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                tracing::warn!("Could not remove {}: {}", staging.display(), cleanup);
            }
            Err(e)
        }
    }
}

/// `<dir>.partial`, alongside the target directory
fn staging_dir(dir: &Path) -> Result<PathBuf> {
    let name = dir.file_name().ok_or_else(|| {
        ArchiverError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("chunk directory has no name: {}", dir.display()),
        ))
    })?;
    let mut staged = name.to_os_string();
    staged.push(".partial");
    Ok(dir.with_file_name(staged))
}

fn write_archive(store: &dyn RecordStore, dir: &Path, chunk_size: usize) -> Result<PackSummary> {
    let mut stream = ChunkStream::new(store.entries(), ChunkEncoder::new(chunk_size, gzip_compressor));
    let mut summary = PackSummary {
        records: 0,
        chunks: 0,
        bytes: 0,
    };

    for chunk in stream.by_ref() {
        let chunk = chunk?;
        tracing::debug!(
            "Writing chunk {} ({} records, {} bytes)",
            chunk.id,
            chunk.entries,
            chunk.bytes.len()
        );
        fs::write(dir.join(chunk_file_name(chunk.id)), &chunk.bytes)?;
        summary.records += chunk.entries;
        summary.chunks += 1;
        summary.bytes += chunk.bytes.len() as u64;
    }

    let index = stream
        .into_index()
        .ok_or_else(|| ArchiverError::CorruptArchive("chunk stream ended early".to_string()))?;
    index.write_to(&dir.join(INDEX_FILE_NAME))?;

    Ok(summary)
}
