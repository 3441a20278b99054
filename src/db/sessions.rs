//! Session repository: opaque session tokens issued at login.

use super::DbError;
use super::users::User;
use sqlx::SqlitePool;

pub struct SessionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, token: &str, user_id: i64, expires_at: i64) -> Result<(), DbError> {
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Look up the session's owning user, but only if the session exists
    /// and has not expired. Expired-but-present sessions are treated the
    /// same as absent ones (`NotFound`) so the caller doesn't need a
    /// separate expiry check.
    pub async fn find_valid_user(&self, token: &str, now: i64) -> Result<User, DbError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.password_hash, u.is_admin, u.created_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token = ? AND s.expires_at > ?
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }

    pub async fn delete(&self, token: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
