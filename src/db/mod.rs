//! Database module for persistent storage.
//!
//! Provides async SQLite database access via `sqlx` for every entity in
//! the data model: users, sessions, machines, credentials, samples, alert
//! rules/events, and notification channels.

mod alert_events;
mod alert_rules;
mod chat_recipients;
mod machine_keys;
mod machines;
mod offline_notifications;
mod password_resets;
mod samples;
mod sessions;
mod users;
mod webhooks;

pub use alert_events::AlertEventRepository;
pub use alert_rules::AlertRuleRepository;
pub use chat_recipients::ChatRecipientRepository;
pub use machine_keys::MachineApiKeyRepository;
pub use machines::MachineRepository;
pub use offline_notifications::OfflineNotificationRepository;
pub use password_resets::PasswordResetRepository;
pub use samples::MetricsSampleRepository;
pub use sessions::SessionRepository;
pub use users::UserRepository;
pub use webhooks::WebhookRepository;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Storage-layer errors.
///
/// These map onto `spec.md` Sec. 7's `ApiError` kinds at the service
/// boundary; the storage layer itself stays free of HTTP concerns.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DbError {
    /// Map a raw sqlx error to `Conflict` when it's a unique-constraint
    /// violation, otherwise fall through to the generic `Sqlx` variant.
    pub fn from_unique_violation(err: sqlx::Error, message: impl Into<String>) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return DbError::Conflict(message.into());
        }
        DbError::Sqlx(err)
    }
}

/// One embedded migration file, applied at most once.
struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001_init",
        sql: include_str!("../../migrations/001_init.sql"),
    },
    Migration {
        version: "002_alerts",
        sql: include_str!("../../migrations/002_alerts.sql"),
    },
    Migration {
        version: "003_notifications",
        sql: include_str!("../../migrations/003_notifications.sql"),
    },
    Migration {
        version: "004_machine_api_keys",
        sql: include_str!("../../migrations/004_machine_api_keys.sql"),
    },
];

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open (creating if necessary) the database at `path` and apply any
    /// unapplied migrations in ascending version order.
    pub async fn connect(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            let options = SqliteConnectOptions::new()
                .filename("file::memory:")
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "database connected");

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Ensure the `migrations` table exists, then apply every migration
    /// not yet recorded there, each inside its own transaction.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS migrations (
                version TEXT PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        for migration in MIGRATIONS {
            let already_applied: Option<String> =
                sqlx::query_scalar("SELECT version FROM migrations WHERE version = ?")
                    .bind(migration.version)
                    .fetch_optional(pool)
                    .await?;

            if already_applied.is_some() {
                continue;
            }

            let mut tx = pool.begin().await?;

            for statement in split_statements(migration.sql) {
                sqlx::query(&statement).execute(&mut *tx).await.map_err(|e| {
                    DbError::Migration(format!("{} failed: {}", migration.version, e))
                })?;
            }

            let now = chrono::Utc::now().timestamp();
            sqlx::query("INSERT INTO migrations (version, applied_at) VALUES (?, ?)")
                .bind(migration.version)
                .bind(now)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            info!(version = migration.version, "migration applied");
        }

        Ok(())
    }

    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(&self.pool)
    }

    pub fn sessions(&self) -> SessionRepository<'_> {
        SessionRepository::new(&self.pool)
    }

    pub fn password_resets(&self) -> PasswordResetRepository<'_> {
        PasswordResetRepository::new(&self.pool)
    }

    pub fn machines(&self) -> MachineRepository<'_> {
        MachineRepository::new(&self.pool)
    }

    pub fn machine_keys(&self) -> MachineApiKeyRepository<'_> {
        MachineApiKeyRepository::new(&self.pool)
    }

    pub fn samples(&self) -> MetricsSampleRepository<'_> {
        MetricsSampleRepository::new(&self.pool)
    }

    pub fn alert_rules(&self) -> AlertRuleRepository<'_> {
        AlertRuleRepository::new(&self.pool)
    }

    pub fn alert_events(&self) -> AlertEventRepository<'_> {
        AlertEventRepository::new(&self.pool)
    }

    pub fn webhooks(&self) -> WebhookRepository<'_> {
        WebhookRepository::new(&self.pool)
    }

    pub fn chat_recipients(&self) -> ChatRecipientRepository<'_> {
        ChatRecipientRepository::new(&self.pool)
    }

    pub fn offline_notifications(&self) -> OfflineNotificationRepository<'_> {
        OfflineNotificationRepository::new(&self.pool)
    }
}

/// Split a migration file into individual statements, stripping comment
/// lines, so each can be executed (and error-attributed) separately.
fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .filter_map(|statement| {
            let lines: Vec<&str> = statement
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with("--"))
                .collect();
            if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Database::connect(":memory:").await.unwrap();
        // Re-running against the same pool must not error or duplicate rows.
        Database::run_migrations(db.pool()).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM migrations")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }
}
