//! `GET /internal/metrics`: Prometheus text exposition, unauthenticated
//! (operator-facing, not part of `spec.md`'s session/API-key surface).
//!
//! Kept off the `GET /metrics?machine_id=N` path that §6 reserves for JSON
//! latest-sample reads, to avoid colliding with that binding route.

pub async fn handler() -> String {
    crate::metrics::gather_metrics()
}
