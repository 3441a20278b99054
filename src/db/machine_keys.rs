//! Machine API key repository: credential history and authentication lookup.

use super::DbError;
use super::machines::Machine;
use sqlx::SqlitePool;

pub struct MachineApiKeyRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MachineApiKeyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert one active (non-revoked) key row for a machine.
    pub async fn create_active(&self, machine_id: i64, api_key_hash: &str) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO machine_api_keys (machine_id, api_key_hash, created_at, revoked_at)
             VALUES (?, ?, ?, NULL)",
        )
        .bind(machine_id)
        .bind(api_key_hash)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Revoke every currently active key for a machine, then insert a new
    /// active one, all within a single transaction (`spec.md` Sec. 4.1).
    pub async fn rotate(&self, machine_id: i64, new_key_hash: &str) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE machine_api_keys SET revoked_at = ? WHERE machine_id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(machine_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO machine_api_keys (machine_id, api_key_hash, created_at, revoked_at)
             VALUES (?, ?, ?, NULL)",
        )
        .bind(machine_id)
        .bind(new_key_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Resolve a presented key's hash to its owning machine, but only if a
    /// non-revoked row matches *and* the machine is enabled. A single
    /// `NotFound` covers "unknown key", "revoked key", and "disabled
    /// machine" alike — the HTTP layer turns all three into one generic
    /// 401 (`spec.md` Sec. 4.1 contract guarantee).
    pub async fn find_machine_by_key_hash(&self, api_key_hash: &str) -> Result<Machine, DbError> {
        sqlx::query_as::<_, Machine>(
            r#"
            SELECT m.id, m.user_id, m.name, m.hostname, m.description, m.is_enabled, m.status,
                   m.last_seen, m.platform, m.platform_version, m.kernel_version, m.cpu_cores,
                   m.memory_total_mb, m.disk_total_gb, m.last_boot_time, m.created_at
            FROM machine_api_keys k
            JOIN machines m ON m.id = k.machine_id
            WHERE k.api_key_hash = ? AND k.revoked_at IS NULL AND m.is_enabled = 1
            "#,
        )
        .bind(api_key_hash)
        .fetch_optional(self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }

    /// True count of currently active keys for a machine (should be 0 or 1
    /// in steady state; used by tests asserting the rotation invariant).
    pub async fn count_active(&self, machine_id: i64) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM machine_api_keys WHERE machine_id = ? AND revoked_at IS NULL",
        )
        .bind(machine_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }
}
