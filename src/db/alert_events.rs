//! Alert event repository.

use super::DbError;
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertEvent {
    pub id: i64,
    pub rule_id: i64,
    pub machine_id: i64,
    pub value: f64,
    pub triggered_at: i64,
    pub acknowledged: bool,
    pub acknowledged_at: Option<i64>,
}

pub struct AlertEventRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AlertEventRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an event, preserving the triggering sample's timestamp as
    /// `triggered_at` rather than the wall-clock at emission (`spec.md`
    /// Sec. 5 ordering guarantee).
    pub async fn create(&self, rule_id: i64, machine_id: i64, value: f64, triggered_at: i64) -> Result<AlertEvent, DbError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO alert_events (rule_id, machine_id, value, triggered_at, acknowledged, acknowledged_at)
            VALUES (?, ?, ?, ?, 0, NULL)
            RETURNING id
            "#,
        )
        .bind(rule_id)
        .bind(machine_id)
        .bind(value)
        .bind(triggered_at)
        .fetch_one(self.pool)
        .await?;

        Ok(AlertEvent {
            id,
            rule_id,
            machine_id,
            value,
            triggered_at,
            acknowledged: false,
            acknowledged_at: None,
        })
    }

    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<AlertEvent>, DbError> {
        let events = sqlx::query_as::<_, AlertEvent>(
            r#"
            SELECT e.id, e.rule_id, e.machine_id, e.value, e.triggered_at, e.acknowledged, e.acknowledged_at
            FROM alert_events e
            JOIN alert_rules r ON r.id = e.rule_id
            WHERE r.user_id = ?
            ORDER BY e.triggered_at DESC, e.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(events)
    }

    /// Acknowledge an event, scoped to the requesting user's own rules.
    /// Acknowledgement is UI state only; it never touches evaluator arming.
    pub async fn acknowledge(&self, id: i64, user_id: i64) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE alert_events SET acknowledged = 1, acknowledged_at = ?
            WHERE id = ? AND rule_id IN (SELECT id FROM alert_rules WHERE user_id = ?)
            "#,
        )
        .bind(now)
        .bind(id)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
