//! Alert rule repository.

use super::DbError;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    CpuPct,
    MemUsedPct,
    DiskUsedPct,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::CpuPct => "cpu_pct",
            Metric::MemUsedPct => "mem_used_pct",
            Metric::DiskUsedPct => "disk_used_pct",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cpu_pct" => Some(Metric::CpuPct),
            "mem_used_pct" => Some(Metric::MemUsedPct),
            "disk_used_pct" => Some(Metric::DiskUsedPct),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Above,
    Below,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Above => "above",
            Comparison::Below => "below",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "above" => Some(Comparison::Above),
            "below" => Some(Comparison::Below),
            _ => None,
        }
    }

    /// Strict-inequality predicate per `spec.md` Sec. 4.6: equality never
    /// triggers.
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Above => value > threshold,
            Comparison::Below => value < threshold,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRuleRow {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub metric: String,
    pub comparison: String,
    pub threshold_pct: f64,
    pub trigger_after: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct AlertRule {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub metric: Metric,
    pub comparison: Comparison,
    pub threshold_pct: f64,
    pub trigger_after: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<AlertRuleRow> for AlertRule {
    type Error = DbError;

    fn try_from(row: AlertRuleRow) -> Result<Self, DbError> {
        let metric = Metric::parse(&row.metric)
            .ok_or_else(|| DbError::Internal(format!("unknown metric in storage: {}", row.metric)))?;
        let comparison = Comparison::parse(&row.comparison)
            .ok_or_else(|| DbError::Internal(format!("unknown comparison in storage: {}", row.comparison)))?;
        Ok(AlertRule {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            metric,
            comparison,
            threshold_pct: row.threshold_pct,
            trigger_after: row.trigger_after,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewAlertRule {
    pub name: String,
    pub metric: Metric,
    pub comparison: Comparison,
    pub threshold_pct: f64,
    pub trigger_after: i64,
}

pub struct AlertRuleRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AlertRuleRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: i64, rule: NewAlertRule) -> Result<AlertRule, DbError> {
        let now = chrono::Utc::now().timestamp();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO alert_rules (user_id, name, metric, comparison, threshold_pct, trigger_after, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(&rule.name)
        .bind(rule.metric.as_str())
        .bind(rule.comparison.as_str())
        .bind(rule.threshold_pct)
        .bind(rule.trigger_after)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await?;

        self.get(id, Some(user_id)).await
    }

    pub async fn get(&self, id: i64, owner: Option<i64>) -> Result<AlertRule, DbError> {
        let row = sqlx::query_as::<_, AlertRuleRow>(
            "SELECT id, user_id, name, metric, comparison, threshold_pct, trigger_after, created_at, updated_at
             FROM alert_rules WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        if let Some(owner) = owner
            && row.user_id != owner
        {
            return Err(DbError::NotFound);
        }

        row.try_into()
    }

    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<AlertRule>, DbError> {
        let rows = sqlx::query_as::<_, AlertRuleRow>(
            "SELECT id, user_id, name, metric, comparison, threshold_pct, trigger_after, created_at, updated_at
             FROM alert_rules WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// All rules owned by a machine's owner; used by the evaluator, which
    /// needs every rule for the user whose machine just reported a sample.
    pub async fn list_for_machine_owner(&self, machine_id: i64) -> Result<Vec<AlertRule>, DbError> {
        let rows = sqlx::query_as::<_, AlertRuleRow>(
            r#"
            SELECT r.id, r.user_id, r.name, r.metric, r.comparison, r.threshold_pct,
                   r.trigger_after, r.created_at, r.updated_at
            FROM alert_rules r
            JOIN machines m ON m.user_id = r.user_id
            WHERE m.id = ?
            "#,
        )
        .bind(machine_id)
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn update(&self, id: i64, owner: i64, rule: NewAlertRule) -> Result<AlertRule, DbError> {
        self.get(id, Some(owner)).await?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE alert_rules SET name = ?, metric = ?, comparison = ?, threshold_pct = ?,
                   trigger_after = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&rule.name)
        .bind(rule.metric.as_str())
        .bind(rule.comparison.as_str())
        .bind(rule.threshold_pct)
        .bind(rule.trigger_after)
        .bind(now)
        .bind(id)
        .bind(owner)
        .execute(self.pool)
        .await?;

        self.get(id, Some(owner)).await
    }

    pub async fn delete(&self, id: i64, owner: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM alert_rules WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(owner)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
