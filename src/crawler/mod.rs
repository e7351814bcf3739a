//! Crawler module for forum traversal
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with manual redirect detection
//! - phpBB markup extraction
//! - Global fetch concurrency limiting
//! - Visit tracking across runs
//! - Recursive crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;
mod tracker;

pub use coordinator::{check_div_balance, CrawlJob, CrawlSummary, Crawler};
pub use fetcher::{build_http_client, Fetched, Fetcher, HttpFetcher};
pub use parser::{ForumEntry, ForumPage, PageParser, PhpBbParser, TopicPage};
pub use scheduler::FetchLimiter;
pub use tracker::VisitTracker;

use crate::config::Config;
use crate::storage::RecordStore;
use crate::Result;
use std::sync::Arc;
use url::Url;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Build the HTTP client from the user agent and crawler settings
/// 2. Set up the phpBB parser against the board's base URL
/// 3. Walk the board from its index page, skipping keys already in `store`
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `store` - The record store to fill; also consulted for resume
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Crawl completed; every reachable key is stored
/// * `Err(ArchiverError)` - Crawl aborted; completed keys remain stored
pub async fn crawl(config: &Config, store: Arc<dyn RecordStore>) -> Result<CrawlSummary> {
    let base = Url::parse(&config.crawler.base_url)?;
    let fetcher = HttpFetcher::from_config(&config.user_agent, &config.crawler)?;
    let parser = PhpBbParser::new(base.clone());

    let crawler = Crawler::new(
        Arc::new(fetcher),
        Arc::new(parser),
        store,
        config.crawler.max_concurrent_fetches as usize,
    );
    crawler.run(base.as_str()).await
}
