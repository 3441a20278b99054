//! Prometheus metrics collection for the LunaSentri control plane.
//!
//! Provides production-ready observability via Prometheus metrics exposed on
//! the `/internal/metrics` endpoint: ingestion throughput, alert evaluation,
//! notification delivery outcomes, and machine liveness.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    // ========================================================================
    // Counters (monotonic increasing)
    // ========================================================================

    /// Total metrics samples successfully ingested from agents.
    pub static ref SAMPLES_INGESTED: IntCounter = IntCounter::new(
        "lunasentri_samples_ingested_total",
        "Total metrics samples ingested"
    ).unwrap();

    /// Total ingestion requests rejected for a malformed or out-of-range payload.
    pub static ref SAMPLES_REJECTED: IntCounter = IntCounter::new(
        "lunasentri_samples_rejected_total",
        "Total ingestion requests rejected as invalid"
    ).unwrap();

    /// Total alert events emitted by the evaluator.
    pub static ref ALERT_EVENTS_EMITTED: IntCounter = IntCounter::new(
        "lunasentri_alert_events_emitted_total",
        "Total alert events emitted"
    ).unwrap();

    /// Total webhook deliveries that succeeded.
    pub static ref WEBHOOK_DELIVERIES_SUCCEEDED: IntCounter = IntCounter::new(
        "lunasentri_webhook_deliveries_succeeded_total",
        "Total webhook deliveries that succeeded"
    ).unwrap();

    /// Total webhook deliveries that failed after exhausting retries.
    pub static ref WEBHOOK_DELIVERIES_FAILED: IntCounter = IntCounter::new(
        "lunasentri_webhook_deliveries_failed_total",
        "Total webhook deliveries that failed"
    ).unwrap();

    /// Total chat deliveries that succeeded.
    pub static ref CHAT_DELIVERIES_SUCCEEDED: IntCounter = IntCounter::new(
        "lunasentri_chat_deliveries_succeeded_total",
        "Total chat deliveries that succeeded"
    ).unwrap();

    /// Total chat deliveries that failed after exhausting retries.
    pub static ref CHAT_DELIVERIES_FAILED: IntCounter = IntCounter::new(
        "lunasentri_chat_deliveries_failed_total",
        "Total chat deliveries that failed"
    ).unwrap();

    /// Total machine offline transitions detected by the heartbeat monitor.
    pub static ref MACHINES_WENT_OFFLINE: IntCounter = IntCounter::new(
        "lunasentri_machines_went_offline_total",
        "Total offline transitions detected"
    ).unwrap();

    /// Total machine online-recovery transitions detected by the heartbeat monitor.
    pub static ref MACHINES_RECOVERED: IntCounter = IntCounter::new(
        "lunasentri_machines_recovered_total",
        "Total online-recovery transitions detected"
    ).unwrap();

    // ========================================================================
    // Gauges (can increase/decrease)
    // ========================================================================

    /// Machines currently considered online by the last heartbeat sweep.
    pub static ref MACHINES_ONLINE: IntGauge = IntGauge::new(
        "lunasentri_machines_online",
        "Machines currently online"
    ).unwrap();

    /// Machines currently considered offline by the last heartbeat sweep.
    pub static ref MACHINES_OFFLINE: IntGauge = IntGauge::new(
        "lunasentri_machines_offline",
        "Machines currently offline"
    ).unwrap();
}

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    REGISTRY.register(Box::new(SAMPLES_INGESTED.clone())).unwrap();
    REGISTRY.register(Box::new(SAMPLES_REJECTED.clone())).unwrap();
    REGISTRY.register(Box::new(ALERT_EVENTS_EMITTED.clone())).unwrap();
    REGISTRY.register(Box::new(WEBHOOK_DELIVERIES_SUCCEEDED.clone())).unwrap();
    REGISTRY.register(Box::new(WEBHOOK_DELIVERIES_FAILED.clone())).unwrap();
    REGISTRY.register(Box::new(CHAT_DELIVERIES_SUCCEEDED.clone())).unwrap();
    REGISTRY.register(Box::new(CHAT_DELIVERIES_FAILED.clone())).unwrap();
    REGISTRY.register(Box::new(MACHINES_WENT_OFFLINE.clone())).unwrap();
    REGISTRY.register(Box::new(MACHINES_RECOVERED.clone())).unwrap();
    REGISTRY.register(Box::new(MACHINES_ONLINE.clone())).unwrap();
    REGISTRY.register(Box::new(MACHINES_OFFLINE.clone())).unwrap();
}

/// Gather all metrics and encode them in Prometheus text format.
///
/// Returns a string suitable for HTTP response on `/internal/metrics`.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
