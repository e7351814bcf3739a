//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests to fetch page content
//! - Manual redirect following, reported to the caller as a distinct outcome
//! - Error classification into transport failures

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::{ArchiverError, Result};
use async_trait::async_trait;
use reqwest::{header::LOCATION, redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// Maximum redirect hops followed before giving up
const MAX_REDIRECTS: usize = 10;

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// Page body, served without any redirect
    Page(String),

    /// The URL redirected; carries the final URL of the chain
    Redirect(String),
}

/// Retrieves pages for the crawler
///
/// Implementations must not retry; any failure is reported as
/// [`ArchiverError::Transport`] and aborts the crawl.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Fetched>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `crawler` - Crawler settings (request timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(crawler.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`Fetcher`]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a fetcher from configuration
    pub fn from_config(
        user_agent: &UserAgentConfig,
        crawler: &CrawlerConfig,
    ) -> Result<Self> {
        Ok(Self::new(build_http_client(user_agent, crawler)?))
    }
}

fn transport(url: &str, message: impl Into<String>) -> ArchiverError {
    ArchiverError::Transport {
        url: url.to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// Fetches a URL, following redirects by hand
    ///
    /// # Request Flow
    ///
    /// 1. Send GET request
    /// 2. On 3xx with a Location header, resolve it against the current URL and repeat
    ///    (max 10 hops)
    /// 3. If any hop happened, return the final URL whatever its status
    /// 4. Otherwise return the body of a success response
    ///
    /// A non-success status on an unredirected request, a redirect without
    /// Location, too many hops and every network error are transport failures.
    async fn fetch(&self, url: &str) -> Result<Fetched> {
        let mut current = Url::parse(url)?;
        let mut redirected = false;

        for _ in 0..=MAX_REDIRECTS {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| transport(current.as_str(), e.to_string()))?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        transport(current.as_str(), format!("{} without Location", status))
                    })?;
                let next = current.join(location)?;
                tracing::debug!("Redirect {} -> {}", current, next);
                current = next;
                redirected = true;
                continue;
            }

            // The target of a redirect is never archived, so its status is irrelevant
            if redirected {
                return Ok(Fetched::Redirect(current.to_string()));
            }

            if !status.is_success() {
                return Err(transport(current.as_str(), format!("HTTP {}", status)));
            }

            let body = response
                .text()
                .await
                .map_err(|e| transport(current.as_str(), e.to_string()))?;
            return Ok(Fetched::Page(body));
        }

        Err(transport(url, format!("more than {} redirects", MAX_REDIRECTS)))
    }
}
