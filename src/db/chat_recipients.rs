//! Chat recipient repository (opaque external chat platform).

use super::DbError;
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatRecipient {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: String,
    pub is_active: bool,
    pub failure_count: i64,
    pub last_success_at: Option<i64>,
    pub last_error_at: Option<i64>,
    pub last_attempt_at: Option<i64>,
    pub cooldown_until: Option<i64>,
    pub created_at: i64,
}

pub struct ChatRecipientRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChatRecipientRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: i64, chat_id: &str) -> Result<ChatRecipient, DbError> {
        let now = chrono::Utc::now().timestamp();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO chat_recipients (user_id, chat_id, is_active, failure_count, created_at)
            VALUES (?, ?, 1, 0, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| DbError::from_unique_violation(e, format!("chat recipient already registered: {chat_id}")))?;

        self.get(id, Some(user_id)).await
    }

    pub async fn get(&self, id: i64, owner: Option<i64>) -> Result<ChatRecipient, DbError> {
        let recipient = sqlx::query_as::<_, ChatRecipient>(
            r#"
            SELECT id, user_id, chat_id, is_active, failure_count, last_success_at,
                   last_error_at, last_attempt_at, cooldown_until, created_at
            FROM chat_recipients WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        if let Some(owner) = owner
            && recipient.user_id != owner
        {
            return Err(DbError::NotFound);
        }

        Ok(recipient)
    }

    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<ChatRecipient>, DbError> {
        let recipients = sqlx::query_as::<_, ChatRecipient>(
            r#"
            SELECT id, user_id, chat_id, is_active, failure_count, last_success_at,
                   last_error_at, last_attempt_at, cooldown_until, created_at
            FROM chat_recipients WHERE user_id = ? ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(recipients)
    }

    pub async fn list_active_by_user(&self, user_id: i64) -> Result<Vec<ChatRecipient>, DbError> {
        let recipients = sqlx::query_as::<_, ChatRecipient>(
            r#"
            SELECT id, user_id, chat_id, is_active, failure_count, last_success_at,
                   last_error_at, last_attempt_at, cooldown_until, created_at
            FROM chat_recipients WHERE user_id = ? AND is_active = 1 ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(recipients)
    }

    pub async fn delete(&self, id: i64, owner: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM chat_recipients WHERE id = ? AND user_id = ?")
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
        let result = sqlx::query("UPDATE chat_recipients SET is_active = ? WHERE id = ? AND user_id = ?")
            .bind(active)
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
            UPDATE chat_recipients SET last_success_at = ?, failure_count = 0,
                   last_attempt_at = ?, cooldown_until = NULL
            WHERE id = ?
            "#,
        )
        .bind(when)
        .bind(when)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_failure(
        &self,
        id: i64,
        when: i64,
        failure_count: i64,
        cooldown_until: Option<i64>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE chat_recipients SET last_error_at = ?, failure_count = ?,
                   last_attempt_at = ?, cooldown_until = ?
            WHERE id = ?
            "#,
        )
        .bind(when)
        .bind(failure_count)
        .bind(when)
        .bind(cooldown_until)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn touch_attempt(&self, id: i64, when: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE chat_recipients SET last_attempt_at = ? WHERE id = ?")
            .bind(when)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
