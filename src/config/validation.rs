//! Post-load sanity checks for [`super::types::Config`].

use super::types::Config;
use anyhow::{bail, ensure};

/// Validate a freshly-loaded config, returning a descriptive error for the
/// first thing that's wrong rather than letting the process start in a
/// half-usable state.
pub fn validate(config: &Config) -> anyhow::Result<()> {
    ensure!(
        !config.auth_jwt_secret.is_empty(),
        "AUTH_JWT_SECRET must be set and non-empty"
    );

    if config.port == 0 {
        bail!("PORT must be a non-zero port number");
    }

    if config.admin_email.is_some() != config.admin_password.is_some() {
        bail!("ADMIN_EMAIL and ADMIN_PASSWORD must both be set, or both left unset");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::LogFormat;
    use std::time::Duration;

    fn base_config() -> Config {
        Config {
            db_path: ":memory:".to_string(),
            auth_jwt_secret: "s3cret".to_string(),
            access_token_ttl: Duration::from_secs(3600),
            password_reset_ttl: Duration::from_secs(3600),
            secure_cookie: false,
            cors_allowed_origin: None,
            port: 8080,
            local_host_metrics: false,
            telegram_bot_token: None,
            heartbeat_check_interval: Duration::from_secs(30),
            offline_threshold: Duration::from_secs(120),
            admin_email: None,
            admin_password: None,
            log_format: LogFormat::Json,
        }
    }

    #[test]
    fn rejects_empty_jwt_secret() {
        let mut config = base_config();
        config.auth_jwt_secret.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_zero_port() {
        let mut config = base_config();
        config.port = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_partial_admin_bootstrap_credentials() {
        let mut config = base_config();
        config.admin_email = Some("admin@example.com".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn accepts_well_formed_config() {
        assert!(validate(&base_config()).is_ok());
    }
}
