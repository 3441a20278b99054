//! Password reset repository: single-use reset tokens.

use super::DbError;
use sqlx::SqlitePool;

pub struct PasswordResetRow {
    pub user_id: i64,
}

pub struct PasswordResetRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PasswordResetRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, token: &str, user_id: i64, expires_at: i64) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO password_resets (token, user_id, expires_at, consumed_at) VALUES (?, ?, ?, NULL)",
        )
        .bind(token)
        .bind(user_id)
        .bind(expires_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Consume a reset token atomically: succeeds only if the token exists,
    /// hasn't expired, and hasn't already been consumed. Marks it consumed
    /// in the same statement so a token can never be used twice.
    pub async fn consume(&self, token: &str, now: i64) -> Result<PasswordResetRow, DbError> {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<i64> = sqlx::query_scalar(
            "SELECT user_id FROM password_resets
             WHERE token = ? AND expires_at > ? AND consumed_at IS NULL",
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            return Err(DbError::NotFound);
        };

        sqlx::query("UPDATE password_resets SET consumed_at = ? WHERE token = ?")
            .bind(now)
            .bind(token)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(PasswordResetRow { user_id })
    }
}
