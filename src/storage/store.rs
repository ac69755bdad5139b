use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{DatabaseError, FeedRef, InsertError, NewPost, Post};

/// The storage operations the polling loop depends on.
///
/// [`Database`] is the production implementation; tests substitute stores
/// that fail on demand.
#[async_trait]
pub trait IngestStore: Send + Sync {
    /// The feed to poll next: never-polled feeds first, then oldest `last_fetched_at`.
    async fn next_feed_due(&self) -> Result<Option<FeedRef>, DatabaseError>;

    /// Advance the feed's `last_fetched_at` marker (never backwards).
    async fn mark_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError>;

    /// Insert a post, reporting a URL collision as [`InsertError::DuplicateKey`].
    async fn insert_post(&self, post: &NewPost) -> Result<Post, InsertError>;
}

#[async_trait]
impl IngestStore for Database {
    async fn next_feed_due(&self) -> Result<Option<FeedRef>, DatabaseError> {
        Database::next_feed_due(self).await
    }

    async fn mark_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        Database::mark_fetched(self, feed_id, at).await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, InsertError> {
        Database::insert_post(self, post).await
    }
}
