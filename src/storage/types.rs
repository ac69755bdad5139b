use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

/// Outcome of an insert against a table with a uniqueness constraint.
///
/// A duplicate is an expected condition for callers like the ingester, so it
/// is a distinct variant rather than a message to inspect.
#[derive(Debug, Error)]
pub enum InsertError {
    /// A row with the same unique key already exists
    #[error("already exists: {key}")]
    DuplicateKey { key: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl InsertError {
    /// Classify a sqlx error using the driver's constraint information.
    pub(crate) fn from_sqlx(err: sqlx::Error, key: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                InsertError::DuplicateKey { key: key.into() }
            }
            _ => InsertError::Database(DatabaseError::Other(err)),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, InsertError::DuplicateKey { .. })
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Timestamps are stored as Unix milliseconds.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            name: self.name,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_fetched_at: Option<i64>,
}

impl FeedRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            name: self.name,
            url: self.url,
            user_id: self.user_id,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
            last_fetched_at: self.last_fetched_at.map(from_millis),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: i64,
    pub url: String,
    pub feed_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PostRow {
    pub(crate) fn into_post(self) -> Post {
        Post {
            id: self.id,
            url: self.url,
            feed_id: self.feed_id,
            title: self.title,
            description: self.description,
            published_at: self.published_at.map(from_millis),
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    /// The user who added the feed
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// A feed as seen by the polling loop. `last_fetched_at = None` means never polled.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRef {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl From<Feed> for FeedRef {
    fn from(feed: Feed) -> Self {
        Self {
            id: feed.id,
            name: feed.name,
            url: feed.url,
            last_fetched_at: feed.last_fetched_at,
        }
    }
}

/// Feed listing entry with the name of the user who added it.
#[derive(Debug, Clone)]
pub struct FeedWithOwner {
    pub feed: Feed,
    pub owner_name: String,
}

/// A user following a feed, with both names resolved for display.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: i64,
    pub feed_id: i64,
    pub user_id: i64,
    pub feed_name: String,
    pub feed_url: String,
    pub user_name: String,
}

/// A post about to be inserted. `url` is the uniqueness key.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub url: String,
    pub feed_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub url: String,
    pub feed_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post joined with its feed name, for browsing.
#[derive(Debug, Clone)]
pub struct PostWithFeed {
    pub post: Post,
    pub feed_name: String,
}
