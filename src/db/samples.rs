//! Metrics sample repository: append-only time series per machine.

use super::DbError;
use super::machines::SystemInfoUpdate;
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MetricsSample {
    pub id: i64,
    pub machine_id: i64,
    pub cpu_pct: f64,
    pub mem_used_pct: f64,
    pub disk_used_pct: f64,
    pub net_rx_bytes: Option<i64>,
    pub net_tx_bytes: Option<i64>,
    pub uptime_seconds: Option<f64>,
    pub recorded_at: i64,
}

/// A new sample as presented by an agent.
#[derive(Debug, Clone)]
pub struct NewSample {
    pub cpu_pct: f64,
    pub mem_used_pct: f64,
    pub disk_used_pct: f64,
    pub net_rx_bytes: Option<i64>,
    pub net_tx_bytes: Option<i64>,
    pub uptime_seconds: Option<f64>,
    pub recorded_at: i64,
}

pub struct MetricsSampleRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MetricsSampleRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a sample and touch `last_seen` in one transaction, optionally
    /// merging system info. This is the single write path from ingestion
    /// (`spec.md` Sec. 4.1 "Metric ingestion" transactional boundary).
    pub async fn record(
        &self,
        machine_id: i64,
        sample: &NewSample,
        system_info: Option<&SystemInfoUpdate>,
    ) -> Result<MetricsSample, DbError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO metrics_samples
                (machine_id, cpu_pct, mem_used_pct, disk_used_pct, net_rx_bytes, net_tx_bytes, uptime_seconds, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(machine_id)
        .bind(sample.cpu_pct)
        .bind(sample.mem_used_pct)
        .bind(sample.disk_used_pct)
        .bind(sample.net_rx_bytes)
        .bind(sample.net_tx_bytes)
        .bind(sample.uptime_seconds)
        .bind(sample.recorded_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE machines SET last_seen = ? WHERE id = ?")
            .bind(sample.recorded_at)
            .bind(machine_id)
            .execute(&mut *tx)
            .await?;

        if let Some(info) = system_info {
            sqlx::query(
                r#"
                UPDATE machines SET
                    platform = COALESCE(?, platform),
                    platform_version = COALESCE(?, platform_version),
                    kernel_version = COALESCE(?, kernel_version),
                    cpu_cores = COALESCE(?, cpu_cores),
                    memory_total_mb = COALESCE(?, memory_total_mb),
                    disk_total_gb = COALESCE(?, disk_total_gb),
                    last_boot_time = COALESCE(?, last_boot_time)
                WHERE id = ?
                "#,
            )
            .bind(&info.platform)
            .bind(&info.platform_version)
            .bind(&info.kernel_version)
            .bind(info.cpu_cores)
            .bind(info.memory_total_mb)
            .bind(info.disk_total_gb)
            .bind(info.last_boot_time)
            .bind(machine_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(MetricsSample {
            id,
            machine_id,
            cpu_pct: sample.cpu_pct,
            mem_used_pct: sample.mem_used_pct,
            disk_used_pct: sample.disk_used_pct,
            net_rx_bytes: sample.net_rx_bytes,
            net_tx_bytes: sample.net_tx_bytes,
            uptime_seconds: sample.uptime_seconds,
            recorded_at: sample.recorded_at,
        })
    }

    pub async fn latest(&self, machine_id: i64) -> Result<MetricsSample, DbError> {
        sqlx::query_as::<_, MetricsSample>(
            r#"
            SELECT id, machine_id, cpu_pct, mem_used_pct, disk_used_pct, net_rx_bytes,
                   net_tx_bytes, uptime_seconds, recorded_at
            FROM metrics_samples WHERE machine_id = ? ORDER BY recorded_at DESC, id DESC LIMIT 1
            "#,
        )
        .bind(machine_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }
}
