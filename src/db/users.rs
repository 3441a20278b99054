//! User repository: accounts, admin bootstrap, password hash storage.

use super::DbError;
use sqlx::SqlitePool;

/// A registered user.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: i64,
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of registered users, used to decide whether the next
    /// registration (self-service or bootstrap) becomes the admin.
    pub async fn count(&self) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Insert a new user. `is_admin` is decided by the caller (first user,
    /// or an explicit bootstrap admin).
    pub async fn create(
        &self,
        email: &str,
        password_hash: &str,
        is_admin: bool,
    ) -> Result<User, DbError> {
        let now = chrono::Utc::now().timestamp();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (email, password_hash, is_admin, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(is_admin)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| DbError::from_unique_violation(e, format!("email already registered: {email}")))?;

        Ok(User {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_admin,
            created_at: now,
        })
    }

    pub async fn find_by_email(&self, email: &str) -> Result<User, DbError> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, is_admin, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }

    pub async fn exists_by_email(&self, email: &str) -> Result<bool, DbError> {
        let row: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<User, DbError> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, is_admin, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }

    /// Rotate a user's password hash (used by password reset consumption).
    pub async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
