use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, InsertError, NewPost, Post, PostRow, PostWithFeed};

/// Hard cap for browse queries
pub const MAX_POSTS: u32 = 500;

#[derive(Debug, sqlx::FromRow)]
struct PostFeedRow {
    #[sqlx(flatten)]
    post: PostRow,
    feed_name: String,
}

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post. A post with the same URL yields [`InsertError::DuplicateKey`].
    ///
    /// Existing rows are never updated: the first version of a post wins.
    pub async fn insert_post(&self, post: &NewPost) -> Result<Post, InsertError> {
        let now = to_millis(Utc::now());
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            INSERT INTO posts (url, feed_id, title, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, url, feed_id, title, description, published_at, created_at, updated_at
        "#,
        )
        .bind(&post.url)
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.description)
        .bind(post.published_at.map(to_millis))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| InsertError::from_sqlx(e, post.url.clone()))?;

        Ok(row.into_post())
    }

    /// Latest posts from the feeds a user follows.
    ///
    /// Newest `published_at` first; posts without a date sort last.
    /// `limit` is capped at [`MAX_POSTS`].
    pub async fn posts_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<PostWithFeed>, DatabaseError> {
        let limit = limit.clamp(0, i64::from(MAX_POSTS));
        let rows = sqlx::query_as::<_, PostFeedRow>(
            r#"
            SELECT p.id, p.url, p.feed_id, p.title, p.description, p.published_at,
                   p.created_at, p.updated_at, f.name AS feed_name
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            JOIN feeds f ON f.id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PostWithFeed {
                post: r.post.into_post(),
                feed_name: r.feed_name,
            })
            .collect())
    }

    /// Number of posts stored for a feed
    pub async fn count_posts_for_feed(&self, feed_id: i64) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
