//! Machine lifecycle service: registration, credential rotation, ownership
//! enforcement, and computed-status derivation (`spec.md` Sec. 4.3).

use crate::db::machines::{Machine, MachinePatch, SystemInfoUpdate};
use crate::db::samples::{MetricsSample, NewSample};
use crate::db::{Database, DbError};
use crate::error::ApiError;
use crate::security::tokens;

#[derive(Clone)]
pub struct MachineService {
    db: Database,
    offline_threshold_secs: i64,
}

impl MachineService {
    pub fn new(db: Database, offline_threshold_secs: i64) -> Self {
        Self { db, offline_threshold_secs }
    }

    /// `last_seen = 0` is the sentinel for "never reported" and always
    /// counts as offline, even if `now` happens to be small (`spec.md`
    /// Sec. 4.5 sweep algorithm step 2).
    pub fn is_online(&self, last_seen: i64, now: i64) -> bool {
        last_seen != 0 && now - last_seen <= self.offline_threshold_secs
    }

    pub fn compute_status(&self, last_seen: i64, now: i64) -> &'static str {
        if self.is_online(last_seen, now) { "online" } else { "offline" }
    }

    pub fn offline_threshold_secs(&self) -> i64 {
        self.offline_threshold_secs
    }

    fn with_computed_status(&self, mut machine: Machine) -> Machine {
        let now = chrono::Utc::now().timestamp();
        machine.status = self.compute_status(machine.last_seen, now).to_string();
        machine
    }

    /// Create a machine plus its first active API key; the plaintext key
    /// is returned exactly once.
    pub async fn register_machine(
        &self,
        user_id: i64,
        name: &str,
        hostname: &str,
        description: &str,
    ) -> Result<(Machine, String), ApiError> {
        let machine = self.db.machines().create(user_id, name, hostname, description).await?;

        let plaintext = generate_api_key();
        let hash = hash_api_key(&plaintext);
        self.db.machine_keys().create_active(machine.id, &hash).await?;

        Ok((machine, plaintext))
    }

    pub async fn list_machines(&self, user_id: i64) -> Result<Vec<Machine>, ApiError> {
        let machines = self.db.machines().list_by_user(user_id).await?;
        Ok(machines.into_iter().map(|m| self.with_computed_status(m)).collect())
    }

    pub async fn get_machine(&self, id: i64, user_id: i64) -> Result<Machine, ApiError> {
        let machine = self.db.machines().get(id, Some(user_id)).await?;
        Ok(self.with_computed_status(machine))
    }

    pub async fn update_machine(&self, id: i64, user_id: i64, patch: MachinePatch) -> Result<Machine, ApiError> {
        let machine = self.db.machines().update(id, user_id, patch).await?;
        Ok(self.with_computed_status(machine))
    }

    pub async fn delete_machine(&self, id: i64, user_id: i64) -> Result<(), ApiError> {
        self.db.machines().delete(id, user_id).await?;
        Ok(())
    }

    pub async fn disable_machine(&self, id: i64, user_id: i64) -> Result<(), ApiError> {
        self.db.machines().set_enabled(id, user_id, false).await?;
        Ok(())
    }

    pub async fn enable_machine(&self, id: i64, user_id: i64) -> Result<(), ApiError> {
        self.db.machines().set_enabled(id, user_id, true).await?;
        Ok(())
    }

    /// Revoke every currently active key and issue one new one.
    pub async fn rotate_machine_api_key(&self, id: i64, user_id: i64) -> Result<String, ApiError> {
        // Ownership check; discard the row, we only needed the NotFound gate.
        self.db.machines().get(id, Some(user_id)).await?;

        let plaintext = generate_api_key();
        let hash = hash_api_key(&plaintext);
        self.db.machine_keys().rotate(id, &hash).await?;
        Ok(plaintext)
    }

    /// Resolve a presented plaintext key to its owning machine. A single
    /// `NotFound` covers unknown key, revoked key, and disabled machine
    /// alike (`spec.md` Sec. 4.1 contract guarantee) — the HTTP layer turns
    /// it into one generic 401.
    pub async fn authenticate_machine(&self, plaintext_key: &str) -> Result<Machine, ApiError> {
        let hash = hash_api_key(plaintext_key);
        match self.db.machine_keys().find_machine_by_key_hash(&hash).await {
            Ok(machine) => Ok(machine),
            Err(DbError::NotFound) => Err(ApiError::Unauthorized),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a sample and touch `last_seen` in one transaction, merging
    /// any system info the agent included.
    pub async fn record_metrics(
        &self,
        machine_id: i64,
        sample: &NewSample,
        system_info: Option<&SystemInfoUpdate>,
    ) -> Result<MetricsSample, ApiError> {
        let recorded = self.db.samples().record(machine_id, sample, system_info).await?;
        Ok(recorded)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}

/// 32 bytes of CSPRNG output, URL-safe base64 without padding (`spec.md`
/// Sec. 4.3 "API-key generation").
fn generate_api_key() -> String {
    tokens::generate_token()
}

/// SHA-256 is sufficient here: the key is already high-entropy, there is
/// no password to stretch (`spec.md` Sec. 4.3).
fn hash_api_key(plaintext: &str) -> String {
    tokens::sha256_hex(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> (MachineService, i64) {
        let db = Database::connect(":memory:").await.unwrap();
        let user = db.users().create("a@example.com", "hash", true).await.unwrap();
        (MachineService::new(db, 120), user.id)
    }

    #[tokio::test]
    async fn rotate_invalidates_old_key_and_leaves_exactly_one_active() {
        let (svc, user_id) = service().await;
        let (machine, k1) = svc.register_machine(user_id, "web-01", "web-01.local", "").await.unwrap();

        let k2 = svc.rotate_machine_api_key(machine.id, user_id).await.unwrap();

        assert!(svc.authenticate_machine(&k1).await.is_err());
        let authenticated = svc.authenticate_machine(&k2).await.unwrap();
        assert_eq!(authenticated.id, machine.id);

        let active = svc.db.machine_keys().count_active(machine.id).await.unwrap();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn disabled_machine_rejects_every_key() {
        let (svc, user_id) = service().await;
        let (machine, key) = svc.register_machine(user_id, "web-01", "web-01.local", "").await.unwrap();

        svc.disable_machine(machine.id, user_id).await.unwrap();
        assert!(svc.authenticate_machine(&key).await.is_err());

        svc.enable_machine(machine.id, user_id).await.unwrap();
        assert!(svc.authenticate_machine(&key).await.is_ok());
    }

    #[tokio::test]
    async fn get_machine_hides_existence_across_owners() {
        let (svc, owner) = service().await;
        let other_user = svc.db.users().create("b@example.com", "hash", false).await.unwrap();
        let (machine, _) = svc.register_machine(owner, "web-01", "web-01.local", "").await.unwrap();

        let result = svc.get_machine(machine.id, other_user.id).await;
        assert!(matches!(result, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn is_online_boundary_is_non_strict() {
        let (svc, _) = service().await;
        assert!(svc.is_online(100, 220));
        assert!(!svc.is_online(100, 221));
        assert!(!svc.is_online(0, 1_000_000));
    }
}
