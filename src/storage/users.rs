use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, InsertError, User, UserRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. A taken name yields [`InsertError::DuplicateKey`].
    pub async fn create_user(&self, name: &str) -> Result<User, InsertError> {
        let now = to_millis(Utc::now());
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (name, created_at, updated_at)
            VALUES (?, ?, ?)
            RETURNING id, name, created_at, updated_at
        "#,
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| InsertError::from_sqlx(e, format!("user {name}")))?;

        tracing::info!(user = %row.name, id = row.id, "Created user");
        Ok(row.into_user())
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserRow::into_user))
    }

    /// All users ordered by name
    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    /// Delete every user. Feeds, follows and posts go with them via ON DELETE CASCADE.
    pub async fn delete_all_users(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
