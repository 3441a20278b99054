//! `/machines/*` handlers (`spec.md` Sec. 6 "Machine management").

use super::extract::SessionUser;
use super::state::AppState;
use crate::db::machines::{Machine, MachinePatch};
use crate::error::ApiResult;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct MachineView {
    id: i64,
    name: String,
    hostname: String,
    description: String,
    is_enabled: bool,
    status: String,
    last_seen: Option<String>,
    platform: Option<String>,
    platform_version: Option<String>,
    kernel_version: Option<String>,
    cpu_cores: Option<i64>,
    memory_total_mb: Option<i64>,
    disk_total_gb: Option<i64>,
    last_boot_time: Option<String>,
    created_at: String,
}

impl From<Machine> for MachineView {
    fn from(m: Machine) -> Self {
        MachineView {
            id: m.id,
            name: m.name,
            hostname: m.hostname,
            description: m.description,
            is_enabled: m.is_enabled,
            status: m.status,
            last_seen: (m.last_seen != 0).then(|| super::iso8601(m.last_seen)),
            platform: m.platform,
            platform_version: m.platform_version,
            kernel_version: m.kernel_version,
            cpu_cores: m.cpu_cores,
            memory_total_mb: m.memory_total_mb,
            disk_total_gb: m.disk_total_gb,
            last_boot_time: m.last_boot_time.map(super::iso8601),
            created_at: super::iso8601(m.created_at),
        }
    }
}

pub async fn list(State(state): State<AppState>, SessionUser(user): SessionUser) -> ApiResult<Json<Vec<MachineView>>> {
    let machines = state.machines.list_machines(user.id).await?;
    Ok(Json(machines.into_iter().map(MachineView::from).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<MachineView>> {
    let machine = state.machines.get_machine(id, user.id).await?;
    Ok(Json(machine.into()))
}

#[derive(Deserialize)]
pub struct UpdateMachine {
    name: Option<String>,
    hostname: Option<String>,
    description: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateMachine>,
) -> ApiResult<Json<MachineView>> {
    let patch = MachinePatch { name: body.name, hostname: body.hostname, description: body.description };
    let machine = state.machines.update_machine(id, user.id, patch).await?;
    Ok(Json(machine.into()))
}

pub async fn delete(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.machines.delete_machine(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn enable(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.machines.enable_machine(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn disable(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.machines.disable_machine(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct ApiKeyView {
    api_key: String,
}

pub async fn rotate_key(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiKeyView>> {
    let api_key = state.machines.rotate_machine_api_key(id, user.id).await?;
    Ok(Json(ApiKeyView { api_key }))
}
