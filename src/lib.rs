//! Forum-Archiver: a resumable forum crawler and static archive packer
//!
//! This crate walks a paginated phpBB-style forum tree into a durable record store,
//! then repacks that store into size-bounded gzip chunks plus a key index for static hosting.

pub mod archive;
pub mod config;
pub mod crawler;
pub mod record;
pub mod storage;

use thiserror::Error;

/// Main error type for Forum-Archiver operations
#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Unexpected markup in {context}: {message}")]
    ParseStructure { context: String, message: String },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Crawl task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiverError {
    /// Builds a parse-structure error for the given page context
    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseStructure {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Forum-Archiver operations
pub type Result<T> = std::result::Result<T, ArchiverError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use archive::{pack_store, ArchiveReader, ChunkIndex, PackSummary};
pub use config::Config;
pub use record::{Item, Key, Post, Record};
