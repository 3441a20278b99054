//! LunaSentri - server-monitoring control plane.
//!
//! Remote agents push host metrics to this service, which persists them,
//! evaluates alert rules, and fans notifications out across webhook and
//! chat channels.

mod alerts;
mod auth;
mod config;
mod db;
mod error;
mod heartbeat;
mod http;
mod ingestion;
mod machines;
mod metrics;
mod notifications;
mod security;

use crate::alerts::AlertEvaluator;
use crate::config::Config;
use crate::db::Database;
use crate::heartbeat::HeartbeatMonitor;
use crate::http::AppState;
use crate::ingestion::IngestionService;
use crate::machines::MachineService;
use crate::notifications::CompositeNotifier;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("ERROR: Failed to load configuration: {e}");
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.log_format {
        crate::config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        crate::config::LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    info!(port = config.port, db_path = %config.db_path, "starting lunasentri");

    metrics::init();

    let db = Database::connect(&config.db_path).await?;

    let auth = auth::AuthService::new(db.clone(), config.access_token_ttl, config.password_reset_ttl);
    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        auth.bootstrap_admin(email, password).await?;
    }

    let offline_threshold_secs = config.offline_threshold.as_secs() as i64;
    let machines = MachineService::new(db.clone(), offline_threshold_secs);
    let evaluator = Arc::new(AlertEvaluator::new(db.clone()));
    let notifier = Arc::new(CompositeNotifier::new(db.clone(), config.telegram_bot_token.clone()));
    let ingestion = Arc::new(IngestionService::new(machines.clone(), Arc::clone(&evaluator), Arc::clone(&notifier)));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let heartbeat = Arc::new(HeartbeatMonitor::new(
        db.clone(),
        machines.clone(),
        Arc::clone(&notifier),
        config.heartbeat_check_interval,
    ));
    let heartbeat_handle = heartbeat.spawn(shutdown_rx);
    info!("heartbeat monitor started");

    let state = AppState {
        db,
        auth,
        machines,
        ingestion,
        notifier,
        secure_cookie: config.secure_cookie,
        cors_allowed_origin: config.cors_allowed_origin.clone(),
        local_host_metrics: config.local_host_metrics,
    };
    let app = http::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, heartbeat_handle).await.is_err() {
        error!("heartbeat monitor did not stop within the shutdown grace period");
    }

    info!("lunasentri stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM, triggering axum's graceful shutdown
/// (`spec.md` Sec. 5 "Graceful shutdown").
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }
}
