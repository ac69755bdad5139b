use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedRef, FeedRow, FeedWithOwner, InsertError};

#[derive(Debug, sqlx::FromRow)]
struct FeedOwnerRow {
    #[sqlx(flatten)]
    feed: FeedRow,
    owner_name: String,
}

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Create a feed owned by `user_id`. Name and URL are both unique.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<Feed, InsertError> {
        let now = to_millis(Utc::now());
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, name, url, user_id, created_at, updated_at, last_fetched_at
        "#,
        )
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| InsertError::from_sqlx(e, format!("feed {name} ({url})")))?;

        tracing::info!(feed = %row.name, url = %row.url, "Created feed");
        Ok(row.into_feed())
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, name, url, user_id, created_at, updated_at, last_fetched_at
            FROM feeds
            WHERE url = ?
        "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FeedRow::into_feed))
    }

    /// All feeds with the name of the user who added each one
    pub async fn list_feeds(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeedOwnerRow>(
            r#"
            SELECT f.id, f.name, f.url, f.user_id, f.created_at, f.updated_at,
                   f.last_fetched_at, u.name AS owner_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.name
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| FeedWithOwner {
                feed: r.feed.into_feed(),
                owner_name: r.owner_name,
            })
            .collect())
    }

    // ========================================================================
    // Polling Operations
    // ========================================================================

    /// The feed polled longest ago. Never-polled feeds come first; ties break on id.
    pub async fn next_feed_due(&self) -> Result<Option<FeedRef>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, name, url, user_id, created_at, updated_at, last_fetched_at
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT 1
        "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.into_feed().into()))
    }

    /// Record that `feed_id` was polled at `at`.
    ///
    /// The marker only moves forward: an `at` older than the stored value is ignored.
    pub async fn mark_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let at = to_millis(at);
        let now = to_millis(Utc::now());
        sqlx::query(
            r#"
            UPDATE feeds SET
                last_fetched_at = CASE
                    WHEN last_fetched_at IS NULL OR last_fetched_at < ? THEN ?
                    ELSE last_fetched_at
                END,
                updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(at)
        .bind(at)
        .bind(now)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
