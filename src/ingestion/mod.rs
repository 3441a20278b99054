//! Ingestion path: agent payload validation and the ingest-then-evaluate
//! pipeline (`spec.md` Sec. 4.4). API-key extraction lives in
//! `http::middleware`; this module owns everything downstream of a
//! resolved `(machine_id, user_id)`.

use crate::alerts::AlertEvaluator;
use crate::db::machines::SystemInfoUpdate;
use crate::db::samples::NewSample;
use crate::error::ApiError;
use crate::machines::MachineService;
use crate::notifications::{CompositeNotifier, NotificationEvent};
use serde::Deserialize;
use std::sync::Arc;

/// Request body for `POST /agent/metrics` (`spec.md` Sec. 4.4 "Payload
/// contract").
#[derive(Debug, Deserialize)]
pub struct MetricsPayload {
    pub timestamp: Option<String>,
    pub cpu_pct: f64,
    pub mem_used_pct: f64,
    pub disk_used_pct: f64,
    pub net_rx_bytes: Option<i64>,
    pub net_tx_bytes: Option<i64>,
    pub uptime_s: Option<f64>,
    pub system_info: Option<SystemInfoPayload>,
}

#[derive(Debug, Deserialize)]
pub struct SystemInfoPayload {
    pub platform: Option<String>,
    pub platform_version: Option<String>,
    pub kernel_version: Option<String>,
    pub cpu_cores: Option<i64>,
    pub memory_total_mb: Option<i64>,
    pub disk_total_gb: Option<i64>,
    pub last_boot_time: Option<i64>,
}

impl MetricsPayload {
    /// Reject out-of-range or non-finite percentages (`spec.md` Sec. 4.4
    /// "Validation"). Malformed JSON is rejected earlier, by the
    /// deserializer itself.
    fn validate(&self) -> Result<(), ApiError> {
        for (name, value) in [
            ("cpu_pct", self.cpu_pct),
            ("mem_used_pct", self.mem_used_pct),
            ("disk_used_pct", self.disk_used_pct),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ApiError::Invalid(format!("{name} must be a finite value in [0, 100]")));
            }
        }
        if let Some(uptime) = self.uptime_s
            && (!uptime.is_finite() || uptime < 0.0)
        {
            return Err(ApiError::Invalid("uptime_s must be a finite, non-negative value".into()));
        }
        Ok(())
    }

    fn recorded_at(&self) -> i64 {
        self.timestamp
            .as_deref()
            .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.timestamp())
            .unwrap_or_else(|| chrono::Utc::now().timestamp())
    }
}

/// Orchestrates a single agent submission: validate, persist, evaluate
/// alert rules synchronously, and fan out any resulting events in the
/// background (`spec.md` Sec. 2 control flow).
pub struct IngestionService {
    machines: MachineService,
    evaluator: Arc<AlertEvaluator>,
    notifier: Arc<CompositeNotifier>,
}

impl IngestionService {
    pub fn new(machines: MachineService, evaluator: Arc<AlertEvaluator>, notifier: Arc<CompositeNotifier>) -> Self {
        Self { machines, evaluator, notifier }
    }

    pub async fn ingest(&self, machine_id: i64, payload: MetricsPayload) -> Result<(), ApiError> {
        if let Err(e) = payload.validate() {
            crate::metrics::SAMPLES_REJECTED.inc();
            return Err(e);
        }

        let recorded_at = payload.recorded_at();
        let system_info = payload.system_info.as_ref().map(|info| SystemInfoUpdate {
            platform: info.platform.clone(),
            platform_version: info.platform_version.clone(),
            kernel_version: info.kernel_version.clone(),
            cpu_cores: info.cpu_cores,
            memory_total_mb: info.memory_total_mb,
            disk_total_gb: info.disk_total_gb,
            last_boot_time: info.last_boot_time,
        });

        let new_sample = NewSample {
            cpu_pct: payload.cpu_pct,
            mem_used_pct: payload.mem_used_pct,
            disk_used_pct: payload.disk_used_pct,
            net_rx_bytes: payload.net_rx_bytes,
            net_tx_bytes: payload.net_tx_bytes,
            uptime_seconds: payload.uptime_s,
            recorded_at,
        };

        let sample = self
            .machines
            .record_metrics(machine_id, &new_sample, system_info.as_ref())
            .await?;
        crate::metrics::SAMPLES_INGESTED.inc();

        // Evaluator runs synchronously on the request path (spec.md Sec.
        // 4.6); dispatch of the resulting events is fanned out in the
        // background so a slow webhook never holds up the agent's 202.
        let emitted = self.evaluator.evaluate(machine_id, &sample).await;
        crate::metrics::ALERT_EVENTS_EMITTED.inc_by(emitted.len() as u64);
        for alert in emitted {
            let notifier = Arc::clone(&self.notifier);
            tokio::spawn(async move {
                notifier
                    .dispatch(NotificationEvent::Alert { rule: alert.rule, event: alert.event })
                    .await;
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(cpu: f64) -> MetricsPayload {
        MetricsPayload {
            timestamp: None,
            cpu_pct: cpu,
            mem_used_pct: 10.0,
            disk_used_pct: 10.0,
            net_rx_bytes: None,
            net_tx_bytes: None,
            uptime_s: None,
            system_info: None,
        }
    }

    #[test]
    fn rejects_out_of_range_percentage() {
        assert!(payload(150.0).validate().is_err());
        assert!(payload(-1.0).validate().is_err());
    }

    #[test]
    fn rejects_non_finite_percentage() {
        assert!(payload(f64::NAN).validate().is_err());
        assert!(payload(f64::INFINITY).validate().is_err());
    }

    #[test]
    fn accepts_boundary_values() {
        assert!(payload(0.0).validate().is_ok());
        assert!(payload(100.0).validate().is_ok());
    }
}
