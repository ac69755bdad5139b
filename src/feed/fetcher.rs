use futures::StreamExt;
use reqwest::header::ACCEPT;
use std::time::Duration;
use thiserror::Error;

use super::parser::parse_feed;
use super::{FeedDocument, FeedError};

/// Identifies the aggregator to feed servers.
pub const DEFAULT_USER_AGENT: &str = "gator";
/// Upper bound for a single feed body.
pub const DEFAULT_MAX_FEED_BYTES: usize = 10 * 1024 * 1024; // 10MB
/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised before the body reaches the XML parser.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP response with a non-2xx status code
    #[error("failed to fetch feed: {status} {status_text}")]
    Status { status: u16, status_text: String },
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },
}

/// Retrieves feed documents over HTTP and hands them to the parser.
///
/// Cheap to clone: the inner `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl FeedFetcher {
    /// Builds a fetcher with its own client carrying `user_agent`.
    pub fn new(user_agent: &str, timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()?;
        Ok(Self::with_client(client, timeout, max_bytes))
    }

    /// Wraps an existing client. The caller is responsible for the user agent.
    pub fn with_client(client: reqwest::Client, timeout: Duration, max_bytes: usize) -> Self {
        Self {
            client,
            timeout,
            max_bytes,
        }
    }

    /// Fetches `url`, parses it as RSS and drops invalid items.
    ///
    /// # Errors
    ///
    /// - [`FeedError::Fetch`] for transport failures, timeouts, oversized
    ///   bodies and non-2xx statuses
    /// - [`FeedError::Parse`] for malformed XML, a missing `<channel>` or
    ///   missing channel fields
    /// - [`FeedError::Validation`] when no item survives validation
    pub async fn fetch(&self, url: &str) -> Result<FeedDocument, FeedError> {
        let bytes = self.fetch_bytes(url).await?;
        let doc = parse_feed(&bytes)?;
        tracing::debug!(url = %url, items = doc.items.len(), "Fetched feed");
        Ok(doc)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request = self
            .client
            .get(url)
            .header(ACCEPT, "application/xml")
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        tokio::time::timeout(self.timeout, read_limited_bytes(response, self.max_bytes))
            .await
            .map_err(|_| FetchError::Timeout)?
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: trust Content-Length when the server sends one
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge { limit });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge { limit });
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
