//! Crawler coordinator - recursive traversal of the forum tree
//!
//! Each forum and topic is a [`CrawlJob`]. A job claims its key, walks every page
//! of its listing, spawns one child job per linked forum or topic, waits for all
//! of them, and only then persists its own record. A record in the store
//! therefore implies its whole subtree is stored too, which is what makes an
//! interrupted crawl resumable: re-running skips every persisted key and redoes
//! only the unfinished part of the tree.
//!
//! Any transport, parse or protocol error is fatal. The first one seen at a join
//! point is returned; dropping the [`JoinSet`] aborts the remaining siblings and,
//! transitively, their children.

use crate::crawler::fetcher::{Fetched, Fetcher};
use crate::crawler::parser::{ForumEntry, PageParser};
use crate::crawler::scheduler::FetchLimiter;
use crate::crawler::tracker::VisitTracker;
use crate::record::{Item, Key, Post, Record};
use crate::storage::RecordStore;
use crate::{ArchiverError, Result};
use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Unit of recursive work
#[derive(Debug)]
pub enum CrawlJob {
    /// A forum whose first page has already been fetched
    Forum { key: Key, content: String },

    /// A topic, fetched by the job itself
    Topic { key: Key, url: String },
}

impl CrawlJob {
    pub fn key(&self) -> &Key {
        match self {
            CrawlJob::Forum { key, .. } | CrawlJob::Topic { key, .. } => key,
        }
    }
}

/// Outcome of a crawl run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Forum records written this run
    pub forums_written: usize,
    /// Topic records written this run
    pub topics_written: usize,
    /// Page requests issued
    pub requests: usize,
}

/// Main crawler structure
pub struct Crawler {
    limiter: FetchLimiter,
    parser: Arc<dyn PageParser>,
    store: Arc<dyn RecordStore>,
    tracker: VisitTracker,
    forums_written: AtomicUsize,
    topics_written: AtomicUsize,
    started: Instant,
}

/// Progress is logged every this many stored records
const PROGRESS_INTERVAL: usize = 100;

impl Crawler {
    /// Creates a crawler sharing `store` with its visit tracker
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Page source; every call goes through the concurrency limiter
    /// * `parser` - Markup extraction for forum and topic pages
    /// * `store` - Durable record store, also the resume checkpoint
    /// * `max_concurrent_fetches` - Global bound on requests in flight
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn PageParser>,
        store: Arc<dyn RecordStore>,
        max_concurrent_fetches: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            limiter: FetchLimiter::new(fetcher, max_concurrent_fetches),
            parser,
            tracker: VisitTracker::new(store.clone()),
            store,
            forums_written: AtomicUsize::new(0),
            topics_written: AtomicUsize::new(0),
            started: Instant::now(),
        })
    }

    pub fn limiter(&self) -> &FetchLimiter {
        &self.limiter
    }

    /// Crawls the board rooted at `root_url` into the store
    ///
    /// If the root record is already stored the archive is complete and no
    /// request is made.
    pub async fn run(self: &Arc<Self>, root_url: &str) -> Result<CrawlSummary> {
        let root = Key::root();
        if self.store.contains(&root)? {
            tracing::info!("Root record already stored, nothing to crawl");
            return Ok(self.summary());
        }

        tracing::info!("Starting crawl at {}", root_url);
        let content = self.limiter.fetch_page(root_url).await?;
        self.clone()
            .execute(CrawlJob::Forum { key: root, content })
            .await?;

        let summary = self.summary();
        tracing::info!(
            "Crawl completed: {} forums and {} topics stored, {} requests in {:?}",
            summary.forums_written,
            summary.topics_written,
            summary.requests,
            self.started.elapsed()
        );
        Ok(summary)
    }

    pub fn summary(&self) -> CrawlSummary {
        CrawlSummary {
            forums_written: self.forums_written.load(Ordering::SeqCst),
            topics_written: self.topics_written.load(Ordering::SeqCst),
            requests: self.limiter.requests_issued(),
        }
    }

    /// Runs a job to completion, boxed so jobs can spawn jobs
    fn execute(self: Arc<Self>, job: CrawlJob) -> BoxFuture<'static, Result<()>> {
        async move {
            match job {
                CrawlJob::Forum { key, content } => self.scan_forum(key, content).await,
                CrawlJob::Topic { key, url } => self.scan_topic(key, url).await,
            }
        }
        .boxed()
    }

    /// Spawns a child job into the parent's join set
    fn dispatch(self: &Arc<Self>, children: &mut JoinSet<Result<()>>, job: CrawlJob) {
        tracing::trace!("Dispatching {}", job.key());
        children.spawn(self.clone().execute(job));
    }

    async fn scan_forum(self: Arc<Self>, key: Key, content: String) -> Result<()> {
        if !self.tracker.claim(&key)? {
            return Ok(());
        }
        tracing::debug!("Scanning forum {}", key);

        let mut content = content;
        let mut items = Vec::new();
        let mut children = JoinSet::new();

        let title = loop {
            let page = self.parser.parse_forum_page(&content)?;

            for entry in page.entries {
                match entry {
                    ForumEntry::Group { title } => items.push(Item::Group { title }),

                    ForumEntry::InlineForum { title, url, key } => {
                        let content = self.limiter.fetch_page(&url).await?;
                        items.push(Item::InlineForum {
                            title,
                            target_key: key.clone(),
                        });
                        self.dispatch(&mut children, CrawlJob::Forum { key, content });
                    }

                    ForumEntry::Forum {
                        title,
                        description,
                        url,
                        key,
                    } => match self.limiter.fetch(&url).await? {
                        Fetched::Redirect(target_url) => items.push(Item::Redirect {
                            title,
                            description: Some(description),
                            target_url,
                        }),
                        Fetched::Page(content) => {
                            items.push(Item::Forum {
                                title,
                                description,
                                target_key: key.clone(),
                            });
                            self.dispatch(&mut children, CrawlJob::Forum { key, content });
                        }
                    },

                    ForumEntry::Topic {
                        title,
                        url,
                        key,
                        user_id,
                        user_name,
                        datetime,
                    } => {
                        items.push(Item::Topic {
                            title,
                            target_key: key.clone(),
                            user_id,
                            user_name,
                            datetime,
                        });
                        self.dispatch(&mut children, CrawlJob::Topic { key, url });
                    }

                    ForumEntry::External {
                        title,
                        description,
                        url,
                    } => items.push(Item::Redirect {
                        title,
                        description: Some(description),
                        target_url: url,
                    }),
                }
            }

            match page.next_page {
                Some(next) => content = self.limiter.fetch_page(&next).await?,
                None => break page.title,
            }
        };

        while let Some(joined) = children.join_next().await {
            joined??;
        }

        self.store.put(&key, &Record::Forum { title, items })?;
        self.record_written(&self.forums_written, &key);
        Ok(())
    }

    async fn scan_topic(self: Arc<Self>, key: Key, url: String) -> Result<()> {
        if !self.tracker.claim(&key)? {
            return Ok(());
        }
        tracing::debug!("Scanning topic {}", key);

        let mut url = url;
        let mut items: Vec<Post> = Vec::new();

        loop {
            let content = self.limiter.fetch_page(&url).await?;
            let page = self.parser.parse_topic_page(&content)?;

            for post in page.posts {
                check_div_balance(&post.content).map_err(|message| {
                    ArchiverError::ProtocolViolation(format!(
                        "post {} in {}: {}",
                        post.post_id, key, message
                    ))
                })?;
                items.push(post);
            }

            match page.next_page {
                Some(next) => url = next,
                None => break,
            }
        }

        self.store.put(&key, &Record::Topic { items })?;
        self.record_written(&self.topics_written, &key);
        Ok(())
    }

    fn record_written(&self, counter: &AtomicUsize, key: &Key) {
        counter.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Stored {}", key);

        let total = self.forums_written.load(Ordering::SeqCst)
            + self.topics_written.load(Ordering::SeqCst);
        if total % PROGRESS_INTERVAL == 0 {
            let elapsed = self.started.elapsed();
            tracing::info!(
                "Progress: {} records stored, {} requests, {:.2} records/sec",
                total,
                self.limiter.requests_issued(),
                total as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
            );
        }
    }
}

/// Checks that every `<div>` opened in a fragment is closed, in order
///
/// [`PhpBbParser`](crate::crawler::PhpBbParser) serializes post content from a
/// parsed tree, so its output always passes; the check matters for parsers that
/// slice raw markup.
pub fn check_div_balance(fragment: &str) -> std::result::Result<(), String> {
    let mut depth: usize = 0;

    for (offset, _) in fragment.match_indices('<') {
        let tag = &fragment[offset + 1..];
        let (closing, tag) = match tag.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, tag),
        };
        let name_len = tag
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(tag.len());
        if !tag[..name_len].eq_ignore_ascii_case("div") {
            continue;
        }

        if closing {
            depth = depth
                .checked_sub(1)
                .ok_or_else(|| format!("unmatched </div> at byte {}", offset))?;
        } else {
            depth += 1;
        }
    }

    if depth == 0 {
        Ok(())
    } else {
        Err(format!("{} unclosed <div>", depth))
    }
}
