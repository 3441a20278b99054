//! Offline-notification dedup repository.
//!
//! Presence of a row means "already notified for the current offline
//! streak"; absence means "free to notify" (`spec.md` Sec. 3).

use super::DbError;
use sqlx::SqlitePool;

pub struct OfflineNotificationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OfflineNotificationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// `notified_at` if a notification was already recorded for this
    /// machine's current offline streak.
    pub async fn notified_at(&self, machine_id: i64) -> Result<Option<i64>, DbError> {
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT notified_at FROM machine_offline_notifications WHERE machine_id = ?",
        )
        .bind(machine_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn mark_notified(&self, machine_id: i64, when: i64) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO machine_offline_notifications (machine_id, notified_at)
            VALUES (?, ?)
            ON CONFLICT(machine_id) DO UPDATE SET notified_at = excluded.notified_at
            "#,
        )
        .bind(machine_id)
        .bind(when)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear(&self, machine_id: i64) -> Result<(), DbError> {
        sqlx::query("DELETE FROM machine_offline_notifications WHERE machine_id = ?")
            .bind(machine_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
