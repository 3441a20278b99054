//! Authentication and session management (`spec.md` Sec. 4.2).
//!
//! Generalizes the teacher's account `identify()` flow: same dummy-hash
//! timing defense on "no such user", same Argon2 verification via
//! `security::password`, but backed by opaque bearer-token sessions
//! instead of NickServ's in-protocol identify.

use crate::db::{Database, DbError};
use crate::db::users::User;
use crate::error::ApiError;
use crate::security::{password, tokens};
use std::time::Duration;

/// Pre-computed Argon2id hash of an arbitrary fixed password, verified
/// against on "no such user" so a failed lookup costs the same wall-clock
/// time as a failed password check (mirrors the teacher's
/// `dummy_password_verify`).
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$dGltaW5nLW9yYWNsZS1kdW1teQ$K4VZh8k8YL3E8H7E8H7E8H7E8H7E8H7E8H7E8H7E8Hs";

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    access_token_ttl: Duration,
    password_reset_ttl: Duration,
}

impl AuthService {
    pub fn new(db: Database, access_token_ttl: Duration, password_reset_ttl: Duration) -> Self {
        Self { db, access_token_ttl, password_reset_ttl }
    }

    /// Create a user; the first user ever registered is promoted to admin
    /// (`spec.md` Sec. 3 "User").
    pub async fn register(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let is_first = self.db.users().count().await? == 0;
        let hash = password::hash_password(password.to_string())
            .await
            .map_err(|_| ApiError::Internal)?;
        let user = self.db.users().create(email, &hash, is_first).await?;
        Ok(user)
    }

    /// Verify credentials and issue a session token on success.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), ApiError> {
        let user = match self.db.users().find_by_email(email).await {
            Ok(user) => user,
            Err(DbError::NotFound) => {
                let _ = crate::security::password::verify_password(
                    password.to_string(),
                    DUMMY_HASH.to_string(),
                )
                .await;
                return Err(ApiError::Unauthorized);
            }
            Err(e) => return Err(e.into()),
        };

        let matches = password::verify_password(password.to_string(), user.password_hash.clone())
            .await
            .map_err(|_| ApiError::Internal)?;
        if !matches {
            return Err(ApiError::Unauthorized);
        }

        let token = tokens::generate_token();
        let expires_at = chrono::Utc::now().timestamp() + self.access_token_ttl.as_secs() as i64;
        self.db.sessions().create(&token, user.id, expires_at).await?;

        Ok((user, token))
    }

    pub async fn verify_session(&self, token: &str) -> Result<User, ApiError> {
        let now = chrono::Utc::now().timestamp();
        match self.db.sessions().find_valid_user(token, now).await {
            Ok(user) => Ok(user),
            Err(DbError::NotFound) => Err(ApiError::Unauthorized),
            Err(e) => Err(e.into()),
        }
    }

    pub fn access_token_ttl_secs(&self) -> i64 {
        self.access_token_ttl.as_secs() as i64
    }

    pub async fn logout(&self, token: &str) -> Result<(), ApiError> {
        self.db.sessions().delete(token).await?;
        Ok(())
    }

    /// Issue a single-use password reset token; silently succeeds even if
    /// the email is unknown, so the caller never learns which emails exist.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>, ApiError> {
        let user = match self.db.users().find_by_email(email).await {
            Ok(user) => user,
            Err(DbError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let token = tokens::generate_token();
        let expires_at = chrono::Utc::now().timestamp() + self.password_reset_ttl.as_secs() as i64;
        self.db.password_resets().create(&token, user.id, expires_at).await?;
        Ok(Some(token))
    }

    /// Consume a reset token and rotate the password hash.
    pub async fn consume_reset(&self, token: &str, new_password: &str) -> Result<(), ApiError> {
        let now = chrono::Utc::now().timestamp();
        let row = match self.db.password_resets().consume(token, now).await {
            Ok(row) => row,
            Err(DbError::NotFound) => return Err(ApiError::Invalid("reset token is invalid or expired".into())),
            Err(e) => return Err(e.into()),
        };

        let hash = password::hash_password(new_password.to_string())
            .await
            .map_err(|_| ApiError::Internal)?;
        self.db.users().update_password_hash(row.user_id, &hash).await?;
        Ok(())
    }

    /// On startup, if the environment provided admin credentials and no
    /// such user exists yet, create it as admin (`spec.md` Sec. 4.2
    /// `BootstrapAdmin`).
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> Result<(), ApiError> {
        if self.db.users().exists_by_email(email).await? {
            return Ok(());
        }
        let hash = password::hash_password(password.to_string())
            .await
            .map_err(|_| ApiError::Internal)?;
        self.db.users().create(email, &hash, true).await?;
        tracing::info!(email = %email, "bootstrap admin created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn service() -> AuthService {
        let db = Database::connect(":memory:").await.unwrap();
        AuthService::new(db, Duration::from_secs(3600), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn first_registered_user_becomes_admin() {
        let auth = service().await;
        let first = auth.register("a@example.com", "hunter22").await.unwrap();
        let second = auth.register("b@example.com", "hunter22").await.unwrap();
        assert!(first.is_admin);
        assert!(!second.is_admin);
    }

    #[tokio::test]
    async fn login_with_unknown_email_is_unauthorized() {
        let auth = service().await;
        let result = auth.login("nobody@example.com", "whatever").await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn login_round_trips_through_session_verification() {
        let auth = service().await;
        auth.register("a@example.com", "hunter22").await.unwrap();
        let (user, token) = auth.login("a@example.com", "hunter22").await.unwrap();
        let verified = auth.verify_session(&token).await.unwrap();
        assert_eq!(verified.id, user.id);

        auth.logout(&token).await.unwrap();
        assert!(auth.verify_session(&token).await.is_err());
    }

    #[tokio::test]
    async fn password_reset_rotates_hash_and_is_single_use() {
        let auth = service().await;
        auth.register("a@example.com", "old-password").await.unwrap();
        let token = auth.request_password_reset("a@example.com").await.unwrap().unwrap();

        auth.consume_reset(&token, "new-password").await.unwrap();
        assert!(auth.login("a@example.com", "old-password").await.is_err());
        assert!(auth.login("a@example.com", "new-password").await.is_ok());

        assert!(auth.consume_reset(&token, "another-password").await.is_err());
    }
}
