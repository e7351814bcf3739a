use serde::Deserialize;

/// Default bound on simultaneously in-flight fetches
pub const DEFAULT_MAX_CONCURRENT_FETCHES: u32 = 16;

/// Default target compressed size of one archive chunk (512 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Main configuration structure for Forum-Archiver
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Board index URL; every relative forum link is resolved against it
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum number of concurrent page fetches
    #[serde(
        rename = "max-concurrent-fetches",
        default = "default_max_concurrent_fetches"
    )]
    pub max_concurrent_fetches: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite record store
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory that receives `<id>.json.gz` chunks and `index.json`
    #[serde(rename = "chunks-dir")]
    pub chunks_dir: String,

    /// Target compressed size per chunk (bytes)
    #[serde(rename = "chunk-size", default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_max_concurrent_fetches() -> u32 {
    DEFAULT_MAX_CONCURRENT_FETCHES
}

fn default_request_timeout() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
