use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, FeedFollow, InsertError};

const FOLLOW_COLUMNS: &str = r#"
    SELECT ff.id, ff.feed_id, ff.user_id,
           f.name AS feed_name, f.url AS feed_url, u.name AS user_name
    FROM feed_follows ff
    JOIN feeds f ON f.id = ff.feed_id
    JOIN users u ON u.id = ff.user_id
"#;

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Follow a feed. Following the same feed twice yields [`InsertError::DuplicateKey`].
    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollow, InsertError> {
        let now = to_millis(Utc::now());
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feed_follows (feed_id, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(feed_id)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| InsertError::from_sqlx(e, format!("follow of feed {feed_id}")))?;

        let follow = sqlx::query_as::<_, FeedFollow>(&format!("{FOLLOW_COLUMNS} WHERE ff.id = ?"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(DatabaseError::from)?;

        tx.commit().await.map_err(DatabaseError::from)?;
        Ok(follow)
    }

    /// Feeds followed by a user, ordered by feed name
    pub async fn feed_follows_for_user(&self, user_id: i64) -> Result<Vec<FeedFollow>, DatabaseError> {
        let follows = sqlx::query_as::<_, FeedFollow>(&format!(
            "{FOLLOW_COLUMNS} WHERE ff.user_id = ? ORDER BY f.name"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(follows)
    }

    /// Stop following the feed at `feed_url`. Returns `false` if no follow existed.
    pub async fn delete_feed_follow(&self, user_id: i64, feed_url: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            DELETE FROM feed_follows
            WHERE user_id = ?
              AND feed_id = (SELECT id FROM feeds WHERE url = ?)
        "#,
        )
        .bind(user_id)
        .bind(feed_url)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
