//! `/agent/*` handlers: machine registration (session-auth) and metric
//! ingestion (API-key auth), `spec.md` Sec. 6 "Agent endpoints".

use super::extract::{ApiKeyMachine, SessionUser};
use super::state::AppState;
use crate::error::ApiResult;
use crate::ingestion::MetricsPayload;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct RegisterMachine {
    name: String,
    hostname: Option<String>,
    description: Option<String>,
}

#[derive(Serialize)]
pub struct RegisteredMachine {
    id: i64,
    name: String,
    hostname: String,
    api_key: String,
    created_at: String,
}

/// The plaintext `api_key` appears only in this response (`spec.md` Sec. 6).
pub async fn register(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Json(body): Json<RegisterMachine>,
) -> ApiResult<(StatusCode, Json<RegisteredMachine>)> {
    let hostname = body.hostname.unwrap_or_default();
    let description = body.description.unwrap_or_default();
    let (machine, api_key) = state
        .machines
        .register_machine(user.id, &body.name, &hostname, &description)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisteredMachine {
            id: machine.id,
            name: machine.name,
            hostname: machine.hostname,
            api_key,
            created_at: super::iso8601(machine.created_at),
        }),
    ))
}

/// `202 Accepted`, no body, on success; 400 on a malformed or out-of-range
/// payload; 401 on an invalid/disabled/revoked key (`spec.md` Sec. 4.4).
pub async fn ingest_metrics(
    State(state): State<AppState>,
    ApiKeyMachine(machine): ApiKeyMachine,
    Json(payload): Json<MetricsPayload>,
) -> ApiResult<StatusCode> {
    state.ingestion.ingest(machine.id, payload).await?;
    Ok(StatusCode::ACCEPTED)
}
