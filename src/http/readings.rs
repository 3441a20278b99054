//! `/metrics`, `/ws`, `/system/info` read endpoints (`spec.md` Sec. 6
//! "Metrics read endpoints"), all session-authenticated.

use super::extract::SessionUser;
use super::state::AppState;
use crate::db::samples::MetricsSample;
use crate::error::{ApiError, ApiResult};
use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize)]
pub struct MachineQuery {
    machine_id: Option<i64>,
}

#[derive(Serialize)]
pub struct SampleView {
    cpu_pct: f64,
    mem_used_pct: f64,
    disk_used_pct: f64,
    net_rx_bytes: Option<i64>,
    net_tx_bytes: Option<i64>,
    uptime_seconds: Option<f64>,
    recorded_at: String,
}

impl From<MetricsSample> for SampleView {
    fn from(s: MetricsSample) -> Self {
        SampleView {
            cpu_pct: s.cpu_pct,
            mem_used_pct: s.mem_used_pct,
            disk_used_pct: s.disk_used_pct,
            net_rx_bytes: s.net_rx_bytes,
            net_tx_bytes: s.net_tx_bytes,
            uptime_seconds: s.uptime_seconds,
            recorded_at: super::iso8601(s.recorded_at),
        }
    }
}

/// A canned reading returned when `LOCAL_HOST_METRICS=true` and the caller
/// omits `machine_id` (`spec.md` Sec. 6 env `LOCAL_HOST_METRICS`). This is a
/// placeholder collector, not real OS introspection.
fn synthetic_sample() -> SampleView {
    SampleView {
        cpu_pct: 0.0,
        mem_used_pct: 0.0,
        disk_used_pct: 0.0,
        net_rx_bytes: Some(0),
        net_tx_bytes: Some(0),
        uptime_seconds: Some(0.0),
        recorded_at: super::iso8601(chrono::Utc::now().timestamp()),
    }
}

async fn resolve_sample(state: &AppState, user_id: i64, machine_id: Option<i64>) -> ApiResult<SampleView> {
    match machine_id {
        Some(id) => {
            state.machines.get_machine(id, user_id).await?;
            let sample = state.machines.db().samples().latest(id).await?;
            Ok(sample.into())
        }
        None if state.local_host_metrics => Ok(synthetic_sample()),
        None => Err(ApiError::Invalid("machine_id is required".into())),
    }
}

pub async fn latest(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Query(query): Query<MachineQuery>,
) -> ApiResult<Json<SampleView>> {
    Ok(Json(resolve_sample(&state, user.id, query.machine_id).await?))
}

#[derive(Serialize)]
pub struct SystemInfoView {
    platform: Option<String>,
    platform_version: Option<String>,
    kernel_version: Option<String>,
    cpu_cores: Option<i64>,
    memory_total_mb: Option<i64>,
    disk_total_gb: Option<i64>,
    last_boot_time: Option<String>,
}

fn synthetic_system_info() -> SystemInfoView {
    SystemInfoView {
        platform: Some("localhost".to_string()),
        platform_version: Some("dev".to_string()),
        kernel_version: None,
        cpu_cores: Some(0),
        memory_total_mb: Some(0),
        disk_total_gb: Some(0),
        last_boot_time: None,
    }
}

pub async fn system_info(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Query(query): Query<MachineQuery>,
) -> ApiResult<Json<SystemInfoView>> {
    match query.machine_id {
        Some(id) => {
            let machine = state.machines.get_machine(id, user.id).await?;
            Ok(Json(SystemInfoView {
                platform: machine.platform,
                platform_version: machine.platform_version,
                kernel_version: machine.kernel_version,
                cpu_cores: machine.cpu_cores,
                memory_total_mb: machine.memory_total_mb,
                disk_total_gb: machine.disk_total_gb,
                last_boot_time: machine.last_boot_time.map(super::iso8601),
            }))
        }
        None if state.local_host_metrics => Ok(Json(synthetic_system_info())),
        None => Err(ApiError::Invalid("machine_id is required".into())),
    }
}

/// Poll-on-interval server push, acceptable per `spec.md` Sec. 6 `GET /ws`.
/// Ownership is checked once up front; the socket then polls for a newer
/// sample every second and forwards it as JSON text frames.
pub async fn stream(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Query(query): Query<MachineQuery>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    if let Some(id) = query.machine_id {
        state.machines.get_machine(id, user.id).await?;
    } else if !state.local_host_metrics {
        return Err(ApiError::Invalid("machine_id is required".into()));
    }

    Ok(ws.on_upgrade(move |socket| stream_samples(socket, state, query.machine_id)))
}

async fn stream_samples(mut socket: WebSocket, state: AppState, machine_id: Option<i64>) {
    let mut last_recorded_at: Option<i64> = None;
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    loop {
        interval.tick().await;

        let view = match machine_id {
            Some(id) => match state.machines.db().samples().latest(id).await {
                Ok(sample) => {
                    if last_recorded_at == Some(sample.recorded_at) {
                        continue;
                    }
                    last_recorded_at = Some(sample.recorded_at);
                    sample.into()
                }
                Err(_) => continue,
            },
            None => synthetic_sample(),
        };

        let Ok(payload) = serde_json::to_string(&view) else { continue };
        if socket.send(Message::Text(payload.into())).await.is_err() {
            return;
        }
    }
}
