//! The `Config` struct and its `load()` entry point.

use super::defaults::*;
use super::validation::validate;
use std::time::Duration;

/// Output format for structured logs, mirroring the teacher's
/// `LogFormat` switch in `main.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Process-wide configuration, assembled once at startup from environment
/// variables (`spec.md` Sec. 6 "Environment").
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub auth_jwt_secret: String,
    pub access_token_ttl: Duration,
    pub password_reset_ttl: Duration,
    pub secure_cookie: bool,
    pub cors_allowed_origin: Option<String>,
    pub port: u16,
    pub local_host_metrics: bool,
    pub telegram_bot_token: Option<String>,
    pub heartbeat_check_interval: Duration,
    pub offline_threshold: Duration,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from the process environment, applying defaults
    /// for everything the spec marks optional, then validate the result.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self {
            db_path: env_string("DB_PATH", DEFAULT_DB_PATH),
            auth_jwt_secret: std::env::var("AUTH_JWT_SECRET").unwrap_or_default(),
            access_token_ttl: Duration::from_secs(
                env_i64("ACCESS_TOKEN_TTL", DEFAULT_ACCESS_TOKEN_TTL_SECS).max(0) as u64,
            ),
            password_reset_ttl: Duration::from_secs(
                env_i64("PASSWORD_RESET_TTL", DEFAULT_PASSWORD_RESET_TTL_SECS).max(0) as u64,
            ),
            secure_cookie: env_bool("SECURE_COOKIE", false),
            cors_allowed_origin: std::env::var("CORS_ALLOWED_ORIGIN").ok().filter(|s| !s.is_empty()),
            port: env_u16("PORT", DEFAULT_PORT),
            local_host_metrics: env_bool("LOCAL_HOST_METRICS", false),
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|s| !s.is_empty()),
            heartbeat_check_interval: Duration::from_secs(env_u64(
                "MACHINE_HEARTBEAT_CHECK_INTERVAL",
                DEFAULT_HEARTBEAT_CHECK_INTERVAL_SECS,
            )),
            offline_threshold: Duration::from_secs(
                env_i64("MACHINE_OFFLINE_THRESHOLD", DEFAULT_OFFLINE_THRESHOLD_SECS).max(0) as u64,
            ),
            admin_email: std::env::var("ADMIN_EMAIL").ok().filter(|s| !s.is_empty()),
            admin_password: std::env::var("ADMIN_PASSWORD").ok().filter(|s| !s.is_empty()),
            log_format: if env_bool("LOG_JSON", true) {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
        };

        validate(&config)?;

        Ok(config)
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
