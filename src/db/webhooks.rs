//! Webhook channel repository.
//!
//! Persists the signing secret in plaintext (see `DESIGN.md` for the
//! webhook-signing open question resolution) alongside a SHA-256
//! fingerprint for display purposes.

use super::DbError;
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Webhook {
    pub id: i64,
    pub user_id: i64,
    pub url: String,
    pub secret_plaintext: String,
    pub secret_fingerprint: String,
    pub is_active: bool,
    pub failure_count: i64,
    pub last_success_at: Option<i64>,
    pub last_error_at: Option<i64>,
    pub last_attempt_at: Option<i64>,
    pub cooldown_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct WebhookRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> WebhookRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        url: &str,
        secret_plaintext: &str,
        secret_fingerprint: &str,
    ) -> Result<Webhook, DbError> {
        let now = chrono::Utc::now().timestamp();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO webhooks (user_id, url, secret_plaintext, secret_fingerprint, is_active,
                                   failure_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, 0, ?, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(url)
        .bind(secret_plaintext)
        .bind(secret_fingerprint)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| DbError::from_unique_violation(e, format!("webhook already registered for url: {url}")))?;

        self.get(id, Some(user_id)).await
    }

    pub async fn get(&self, id: i64, owner: Option<i64>) -> Result<Webhook, DbError> {
        let webhook = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT id, user_id, url, secret_plaintext, secret_fingerprint, is_active, failure_count,
                   last_success_at, last_error_at, last_attempt_at, cooldown_until, created_at, updated_at
            FROM webhooks WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        if let Some(owner) = owner
            && webhook.user_id != owner
        {
            return Err(DbError::NotFound);
        }

        Ok(webhook)
    }

    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Webhook>, DbError> {
        let webhooks = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT id, user_id, url, secret_plaintext, secret_fingerprint, is_active, failure_count,
                   last_success_at, last_error_at, last_attempt_at, cooldown_until, created_at, updated_at
            FROM webhooks WHERE user_id = ? ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(webhooks)
    }

    /// Active webhooks for a user, the composite notifier's fan-out set.
    pub async fn list_active_by_user(&self, user_id: i64) -> Result<Vec<Webhook>, DbError> {
        let webhooks = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT id, user_id, url, secret_plaintext, secret_fingerprint, is_active, failure_count,
                   last_success_at, last_error_at, last_attempt_at, cooldown_until, created_at, updated_at
            FROM webhooks WHERE user_id = ? AND is_active = 1 ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(webhooks)
    }

    pub async fn delete(&self, id: i64, owner: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(owner)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn set_active(&self, id: i64, owner: i64, active: bool) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query("UPDATE webhooks SET is_active = ?, updated_at = ? WHERE id = ? AND user_id = ?")
            .bind(active)
            .bind(now)
            .bind(id)
            .bind(owner)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Manually editing the webhook (this call) clears `cooldown_until`,
    /// letting the user re-enable delivery without waiting it out
    /// (`spec.md` Sec. 4.7 state machine).
    pub async fn clear_cooldown(&self, id: i64, owner: i64) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE webhooks SET cooldown_until = NULL, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(now)
        .bind(id)
        .bind(owner)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn record_success(&self, id: i64, when: i64) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE webhooks SET last_success_at = ?, failure_count = 0, last_attempt_at = ?,
                   cooldown_until = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(when)
        .bind(when)
        .bind(when)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Record a terminal failure. `failure_count` is supplied by the caller
    /// rather than incremented in SQL, because the circuit breaker's
    /// 10-minute window means an old failure sometimes resets the count to
    /// 1 instead of accumulating (`spec.md` Sec. 4.7). `cooldown_until`
    /// arms the breaker when the caller has decided the threshold is met.
    pub async fn record_failure(
        &self,
        id: i64,
        when: i64,
        failure_count: i64,
        cooldown_until: Option<i64>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE webhooks SET last_error_at = ?, failure_count = ?,
                   last_attempt_at = ?, cooldown_until = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(when)
        .bind(failure_count)
        .bind(when)
        .bind(cooldown_until)
        .bind(when)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Only updates `last_attempt_at`; used for the rate-limited manual
    /// test endpoint, which doesn't go through the retry/failure path.
    pub async fn touch_attempt(&self, id: i64, when: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE webhooks SET last_attempt_at = ? WHERE id = ?")
            .bind(when)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
