//! Request extractors for the two authentication modes: cookie-backed
//! sessions for the UI, opaque API keys for agents.

use super::state::AppState;
use crate::db::machines::Machine;
use crate::db::users::User;
use crate::error::ApiError;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

pub const SESSION_COOKIE_NAME: &str = "ls_session";

/// The authenticated user behind a session cookie, resolved via
/// [`crate::auth::AuthService::verify_session`].
pub struct SessionUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_cookie(parts).ok_or(ApiError::Unauthorized)?;
        let user = state.auth.verify_session(&token).await?;
        Ok(SessionUser(user))
    }
}

/// The machine behind a presented API key, resolved via
/// [`crate::machines::MachineService::authenticate_machine`].
pub struct ApiKeyMachine(pub Machine);

#[async_trait]
impl FromRequestParts<AppState> for ApiKeyMachine {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let key = api_key(parts).ok_or(ApiError::Unauthorized)?;
        let machine = state.machines.authenticate_machine(&key).await?;
        Ok(ApiKeyMachine(machine))
    }
}

/// Extract the key from `X-API-Key` or `Authorization: Bearer <key>`
/// (`spec.md` Sec. 4.4 "API-key middleware").
fn api_key(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get("x-api-key")
        && let Ok(value) = value.to_str()
    {
        return Some(value.to_string());
    }

    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn session_cookie(parts: &Parts) -> Option<String> {
    let header_value = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    header_value.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE_NAME).then(|| value.to_string())
    })
}
