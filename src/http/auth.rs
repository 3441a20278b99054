//! `/auth/*` handlers backing `crate::auth::AuthService` (`spec.md` Sec.
//! 4.2). Session state travels in an `HttpOnly`/`SameSite=Lax` cookie,
//! `Secure` gated by config.

use super::extract::{SESSION_COOKIE_NAME, SessionUser};
use super::state::AppState;
use crate::error::ApiResult;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::{self, HeaderValue};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct Credentials {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct UserView {
    id: i64,
    email: String,
    is_admin: bool,
    created_at: String,
}

impl From<crate::db::users::User> for UserView {
    fn from(user: crate::db::users::User) -> Self {
        UserView {
            id: user.id,
            email: user.email,
            is_admin: user.is_admin,
            created_at: crate::http::iso8601(user.created_at),
        }
    }
}

pub async fn register(State(state): State<AppState>, Json(body): Json<Credentials>) -> ApiResult<Response> {
    let user = state.auth.register(&body.email, &body.password).await?;
    Ok((StatusCode::CREATED, Json(UserView::from(user))).into_response())
}

pub async fn login(State(state): State<AppState>, Json(body): Json<Credentials>) -> ApiResult<Response> {
    let (user, token) = state.auth.login(&body.email, &body.password).await?;
    let cookie = build_session_cookie(&token, state.secure_cookie, state.auth.access_token_ttl_secs());
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(UserView::from(user)),
    )
        .into_response())
}

pub async fn logout(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> ApiResult<Response> {
    if let Some(token) = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| find_cookie(v, SESSION_COOKIE_NAME))
    {
        state.auth.logout(&token).await?;
    }

    let cookie = clear_session_cookie(state.secure_cookie);
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}

pub async fn me(SessionUser(user): SessionUser) -> Json<UserView> {
    Json(user.into())
}

#[derive(Deserialize)]
pub struct ResetRequest {
    email: String,
}

/// Always 202, whether or not the email is registered, so the caller never
/// learns which emails exist (`spec.md` Sec. 4.2). The token itself is not
/// returned here — in a deployment with mail transport it would be
/// delivered out of band; this crate has no such component, so it is
/// logged for an operator to relay manually.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(body): Json<ResetRequest>,
) -> ApiResult<StatusCode> {
    if let Some(token) = state.auth.request_password_reset(&body.email).await? {
        tracing::info!(email = %body.email, token = %token, "password reset token issued");
    }
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub struct ConsumeReset {
    token: String,
    new_password: String,
}

pub async fn consume_reset(State(state): State<AppState>, Json(body): Json<ConsumeReset>) -> ApiResult<StatusCode> {
    state.auth.consume_reset(&body.token, &body.new_password).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn build_session_cookie(token: &str, secure: bool, max_age_secs: i64) -> HeaderValue {
    let mut cookie = format!("{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn clear_session_cookie(secure: bool) -> HeaderValue {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn find_cookie(header_value: &str, name: &str) -> Option<String> {
    header_value.split(';').find_map(|pair| {
        let (n, v) = pair.trim().split_once('=')?;
        (n == name).then(|| v.to_string())
    })
}
