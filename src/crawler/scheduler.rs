//! Global fetch concurrency limiting
//!
//! Every page request made by the crawler (listings, pagination, inline forums,
//! forum link resolution, topics) goes through one [`FetchLimiter`]. It bounds
//! requests in flight, not tasks: a task waiting on its children holds no permit.

use crate::crawler::fetcher::{Fetched, Fetcher};
use crate::{ArchiverError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Counting semaphore wrapped around a [`Fetcher`]
pub struct FetchLimiter {
    /// Global semaphore for limiting concurrent fetches
    semaphore: Arc<Semaphore>,

    fetcher: Arc<dyn Fetcher>,

    /// Requests currently holding a permit
    in_flight: AtomicUsize,

    /// Highest value `in_flight` has reached
    peak: AtomicUsize,

    /// Total requests issued
    issued: AtomicUsize,
}

impl FetchLimiter {
    /// Creates a limiter allowing `max_concurrent` requests at once
    pub fn new(fetcher: Arc<dyn Fetcher>, max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            fetcher,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
        }
    }

    /// Fetches `url` once a permit is available
    ///
    /// The permit is held until the fetcher has returned, which includes
    /// reading the body.
    pub async fn fetch(&self, url: &str) -> Result<Fetched> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ArchiverError::ProtocolViolation("fetch limiter closed".to_string()))?;

        let (_in_flight, current) = InFlight::enter(&self.in_flight);
        self.peak.fetch_max(current, Ordering::SeqCst);
        self.issued.fetch_add(1, Ordering::SeqCst);

        tracing::trace!("Fetching {} ({} in flight)", url, current);
        self.fetcher.fetch(url).await
    }

    /// Fetches a page that must be served directly
    ///
    /// A redirect here means the board is not shaped the way the crawl expects.
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        match self.fetch(url).await? {
            Fetched::Page(body) => Ok(body),
            Fetched::Redirect(target) => Err(ArchiverError::ProtocolViolation(format!(
                "{} redirected to {}",
                url, target
            ))),
        }
    }

    /// Highest number of simultaneous requests observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of requests issued so far
    pub fn requests_issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Requests currently in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Permits currently available
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Counts one request in flight until dropped, including when the fetch is aborted
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let current = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (Self(counter), current)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
