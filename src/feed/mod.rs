//! Feed retrieval and RSS parsing.
//!
//! - [`fetcher`] - HTTP GET with identifying headers, size limit and timeout
//! - [`parser`] - RSS 2.0 channel/item extraction with tolerant per-item validation
//!
//! A fetched document only lives long enough to be ingested; nothing in this
//! module touches storage.

mod fetcher;
mod parser;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use fetcher::{
    FeedFetcher, FetchError, DEFAULT_MAX_FEED_BYTES, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT,
};
pub use parser::parse_feed;

/// A channel with the items that passed validation.
#[derive(Debug, Clone)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<FeedItem>,
}

/// One `<item>` with all required fields present.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// `None` when absent or unparseable.
    pub published_at: Option<DateTime<Utc>>,
}

/// The document could not be understood as RSS.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    Xml(String),
    #[error("no channel found in feed")]
    NoChannel,
    #[error("missing required channel fields: {0}")]
    MissingChannelFields(String),
}

/// The document parsed but carried nothing worth ingesting.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("feed contains no valid items after filtering ({dropped} dropped)")]
    NoValidItems { dropped: usize },
}

/// Everything that can go wrong between a feed URL and a [`FeedDocument`].
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
