//! One ingestion cycle: pick the feed due next, fetch it, store new posts.
//!
//! Post URLs are unique in storage, so re-ingesting an unchanged feed only
//! produces duplicate outcomes. Those are counted, never reported as errors.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

use crate::feed::{FeedDocument, FeedError, FeedFetcher};
use crate::scheduler::CycleRunner;
use crate::storage::{DatabaseError, FeedRef, IngestStore, InsertError, NewPost};

/// Counts for a finished cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// `None` when no feed was due
    pub feed_name: Option<String>,
    pub new_count: usize,
    pub duplicate_count: usize,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("feed '{feed}': {source}")]
    Feed {
        feed: String,
        #[source]
        source: FeedError,
    },
    #[error("feed '{feed}': storing post failed after {new_count} new: {source}")]
    Insert {
        feed: String,
        new_count: usize,
        #[source]
        source: DatabaseError,
    },
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Anything that turns a URL into a validated feed document.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FeedDocument, FeedError>;
}

#[async_trait]
impl FeedSource for FeedFetcher {
    async fn fetch(&self, url: &str) -> Result<FeedDocument, FeedError> {
        FeedFetcher::fetch(self, url).await
    }
}

/// Runs ingestion cycles against a store and a feed source.
pub struct Ingester {
    store: Arc<dyn IngestStore>,
    source: Arc<dyn FeedSource>,
}

impl Ingester {
    pub fn new(store: Arc<dyn IngestStore>, source: Arc<dyn FeedSource>) -> Self {
        Self { store, source }
    }

    /// Ingest the single feed that is most overdue.
    ///
    /// The feed's `last_fetched_at` is advanced to the cycle's start time
    /// whether or not fetching and storing succeed, so a broken feed goes to
    /// the back of the queue instead of being retried every tick.
    pub async fn run_cycle(&self) -> Result<CycleSummary, IngestError> {
        let Some(feed) = self.store.next_feed_due().await? else {
            tracing::info!("Nothing to fetch: no feeds registered");
            return Ok(CycleSummary::default());
        };

        let started_at = Utc::now();
        tracing::debug!(feed = %feed.name, url = %feed.url, "Fetching feed");

        let outcome = self.ingest_feed(&feed).await;

        if let Err(e) = self.store.mark_fetched(feed.id, started_at).await {
            tracing::error!(feed = %feed.name, error = %e, "Failed to update last_fetched_at");
            // The ingest error, if any, is the more useful one to surface
            outcome?;
            return Err(e.into());
        }

        let summary = outcome?;
        tracing::info!(
            feed = %feed.name,
            new = summary.new_count,
            duplicates = summary.duplicate_count,
            "Collected feed"
        );
        Ok(summary)
    }

    async fn ingest_feed(&self, feed: &FeedRef) -> Result<CycleSummary, IngestError> {
        let doc = self
            .source
            .fetch(&feed.url)
            .await
            .map_err(|source| {
                tracing::warn!(feed = %feed.name, url = %feed.url, error = %source, "Feed fetch failed");
                IngestError::Feed {
                    feed: feed.name.clone(),
                    source,
                }
            })?;

        let mut summary = CycleSummary {
            feed_name: Some(feed.name.clone()),
            ..CycleSummary::default()
        };

        for item in doc.items {
            let post = NewPost {
                url: item.link,
                feed_id: feed.id,
                title: item.title,
                description: Some(item.description),
                published_at: item.published_at,
            };

            match self.store.insert_post(&post).await {
                Ok(_) => summary.new_count += 1,
                Err(InsertError::DuplicateKey { .. }) => {
                    tracing::trace!(url = %post.url, "Post already stored");
                    summary.duplicate_count += 1;
                }
                Err(InsertError::Database(source)) => {
                    tracing::error!(feed = %feed.name, url = %post.url, error = %source, "Failed to store post");
                    return Err(IngestError::Insert {
                        feed: feed.name.clone(),
                        new_count: summary.new_count,
                        source,
                    });
                }
            }
        }

        Ok(summary)
    }
}

#[async_trait]
impl CycleRunner for Ingester {
    type Output = CycleSummary;
    type Error = IngestError;

    async fn run_cycle(&self) -> Result<CycleSummary, IngestError> {
        Ingester::run_cycle(self).await
    }
}
