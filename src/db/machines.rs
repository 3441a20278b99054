//! Machine repository: registry rows and system-info updates.
//!
//! `status` here is the last value the heartbeat monitor persisted; it is
//! *not* recomputed on read by this layer (that happens in the machine
//! service, per `spec.md` Sec. 4.3's `GetMachineWithComputedStatus`).

use super::DbError;
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Machine {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub hostname: String,
    pub description: String,
    pub is_enabled: bool,
    pub status: String,
    pub last_seen: i64,
    pub platform: Option<String>,
    pub platform_version: Option<String>,
    pub kernel_version: Option<String>,
    pub cpu_cores: Option<i64>,
    pub memory_total_mb: Option<i64>,
    pub disk_total_gb: Option<i64>,
    pub last_boot_time: Option<i64>,
    pub created_at: i64,
}

/// Fields an agent may report alongside a metrics sample; any `None`
/// fields leave the stored value untouched (opportunistic merge).
#[derive(Debug, Clone, Default)]
pub struct SystemInfoUpdate {
    pub platform: Option<String>,
    pub platform_version: Option<String>,
    pub kernel_version: Option<String>,
    pub cpu_cores: Option<i64>,
    pub memory_total_mb: Option<i64>,
    pub disk_total_gb: Option<i64>,
    pub last_boot_time: Option<i64>,
}

/// Patchable fields for `PUT /machines/{id}`.
#[derive(Debug, Clone, Default)]
pub struct MachinePatch {
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub description: Option<String>,
}

pub struct MachineRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MachineRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: i64, name: &str, hostname: &str, description: &str) -> Result<Machine, DbError> {
        let now = chrono::Utc::now().timestamp();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO machines (user_id, name, hostname, description, is_enabled, status, last_seen, created_at)
            VALUES (?, ?, ?, ?, 1, 'unknown', 0, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(hostname)
        .bind(description)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| DbError::from_unique_violation(e, format!("machine name already in use: {name}")))?;

        self.get(id, None).await
    }

    /// Fetch by ID. When `owner` is `Some`, the row is returned only if it
    /// belongs to that user; mismatches surface as `NotFound` (not
    /// `Forbidden`) so existence isn't leaked across owners.
    pub async fn get(&self, id: i64, owner: Option<i64>) -> Result<Machine, DbError> {
        let machine = sqlx::query_as::<_, Machine>(
            r#"
            SELECT id, user_id, name, hostname, description, is_enabled, status, last_seen,
                   platform, platform_version, kernel_version, cpu_cores, memory_total_mb,
                   disk_total_gb, last_boot_time, created_at
            FROM machines WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        if let Some(owner) = owner
            && machine.user_id != owner
        {
            return Err(DbError::NotFound);
        }

        Ok(machine)
    }

    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Machine>, DbError> {
        let machines = sqlx::query_as::<_, Machine>(
            r#"
            SELECT id, user_id, name, hostname, description, is_enabled, status, last_seen,
                   platform, platform_version, kernel_version, cpu_cores, memory_total_mb,
                   disk_total_gb, last_boot_time, created_at
            FROM machines WHERE user_id = ? ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(machines)
    }

    /// All machines, across every user. Used exclusively by the heartbeat
    /// monitor, which is the one cross-user reader in the system.
    pub async fn list_all(&self) -> Result<Vec<Machine>, DbError> {
        let machines = sqlx::query_as::<_, Machine>(
            r#"
            SELECT id, user_id, name, hostname, description, is_enabled, status, last_seen,
                   platform, platform_version, kernel_version, cpu_cores, memory_total_mb,
                   disk_total_gb, last_boot_time, created_at
            FROM machines ORDER BY id
            "#,
        )
        .fetch_all(self.pool)
        .await?;
        Ok(machines)
    }

    pub async fn update(&self, id: i64, owner: i64, patch: MachinePatch) -> Result<Machine, DbError> {
        let existing = self.get(id, Some(owner)).await?;

        let name = patch.name.unwrap_or(existing.name);
        let hostname = patch.hostname.unwrap_or(existing.hostname);
        let description = patch.description.unwrap_or(existing.description);

        sqlx::query("UPDATE machines SET name = ?, hostname = ?, description = ? WHERE id = ?")
            .bind(&name)
            .bind(&hostname)
            .bind(&description)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| DbError::from_unique_violation(e, format!("machine name already in use: {name}")))?;

        self.get(id, Some(owner)).await
    }

    pub async fn delete(&self, id: i64, owner: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM machines WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(owner)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn set_enabled(&self, id: i64, owner: i64, enabled: bool) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE machines SET is_enabled = ? WHERE id = ? AND user_id = ?")
            .bind(enabled)
            .bind(id)
            .bind(owner)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Update only `last_seen`. Must never touch `status` — that column is
    /// owned exclusively by the heartbeat monitor (`spec.md` Sec. 4.1).
    pub async fn touch_last_seen(&self, id: i64, when: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE machines SET last_seen = ? WHERE id = ?")
            .bind(when)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Merge in whichever system-info fields the agent sent; `None` fields
    /// leave the current value alone via `COALESCE`.
    pub async fn merge_system_info(&self, id: i64, info: &SystemInfoUpdate) -> Result<(), DbError> {
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
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Persist a new `status`. Only the heartbeat monitor should call this.
    pub async fn set_status(&self, id: i64, status: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE machines SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
