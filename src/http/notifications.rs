//! `/notifications/*` handlers (`spec.md` Sec. 6 "Channels"): CRUD plus a
//! rate-limited manual `/test` send, for both webhook and chat channels.

use super::extract::SessionUser;
use super::state::AppState;
use crate::db::chat_recipients::ChatRecipient;
use crate::db::webhooks::Webhook;
use crate::error::{ApiError, ApiResult};
use crate::notifications::{chat, webhook};
use crate::security::tokens;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct WebhookView {
    id: i64,
    url: String,
    secret_fingerprint: String,
    is_active: bool,
    failure_count: i64,
    last_success_at: Option<String>,
    last_error_at: Option<String>,
    cooldown_until: Option<String>,
    created_at: String,
}

impl From<Webhook> for WebhookView {
    fn from(w: Webhook) -> Self {
        WebhookView {
            id: w.id,
            url: w.url,
            secret_fingerprint: w.secret_fingerprint,
            is_active: w.is_active,
            failure_count: w.failure_count,
            last_success_at: w.last_success_at.map(super::iso8601),
            last_error_at: w.last_error_at.map(super::iso8601),
            cooldown_until: w.cooldown_until.map(super::iso8601),
            created_at: super::iso8601(w.created_at),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateWebhook {
    url: String,
    secret: String,
}

pub async fn list_webhooks(State(state): State<AppState>, SessionUser(user): SessionUser) -> ApiResult<Json<Vec<WebhookView>>> {
    let webhooks = state.db.webhooks().list_by_user(user.id).await?;
    Ok(Json(webhooks.into_iter().map(WebhookView::from).collect()))
}

/// The signing secret is user-supplied, 16..128 bytes (`spec.md` Sec. 3
/// "Webhook"); the server persists it so it can sign outbound deliveries,
/// but subsequent reads expose only its `secret_fingerprint`.
pub async fn create_webhook(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Json(body): Json<CreateWebhook>,
) -> ApiResult<(StatusCode, Json<WebhookView>)> {
    if !(16..=128).contains(&body.secret.len()) {
        return Err(ApiError::Invalid("secret must be 16..128 bytes".into()));
    }
    let fingerprint = tokens::sha256_hex(&body.secret);
    let created = state.db.webhooks().create(user.id, &body.url, &body.secret, &fingerprint).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.db.webhooks().delete(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn enable_webhook(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.db.webhooks().set_active(id, user.id, true).await?;
    state.db.webhooks().clear_cooldown(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn disable_webhook(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.db.webhooks().set_active(id, user.id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn test_webhook(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let hook = state.db.webhooks().get(id, Some(user.id)).await?;
    match state.notifier.webhooks().test(&state.db, &hook).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(webhook::DispatchOutcome::CoolingDown { retry_after_secs }) => {
            Err(ApiError::RateLimited { retry_after_secs })
        }
        Err(_) => Err(ApiError::Unavailable("webhook delivery failed".into())),
    }
}

#[derive(Serialize)]
pub struct ChatRecipientView {
    id: i64,
    chat_id: String,
    is_active: bool,
    failure_count: i64,
    last_success_at: Option<String>,
    last_error_at: Option<String>,
    cooldown_until: Option<String>,
    created_at: String,
}

impl From<ChatRecipient> for ChatRecipientView {
    fn from(r: ChatRecipient) -> Self {
        ChatRecipientView {
            id: r.id,
            chat_id: r.chat_id,
            is_active: r.is_active,
            failure_count: r.failure_count,
            last_success_at: r.last_success_at.map(super::iso8601),
            last_error_at: r.last_error_at.map(super::iso8601),
            cooldown_until: r.cooldown_until.map(super::iso8601),
            created_at: super::iso8601(r.created_at),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateChatRecipient {
    chat_id: String,
}

pub async fn list_chat_recipients(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
) -> ApiResult<Json<Vec<ChatRecipientView>>> {
    let recipients = state.db.chat_recipients().list_by_user(user.id).await?;
    Ok(Json(recipients.into_iter().map(ChatRecipientView::from).collect()))
}

pub async fn create_chat_recipient(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Json(body): Json<CreateChatRecipient>,
) -> ApiResult<(StatusCode, Json<ChatRecipientView>)> {
    let created = state.db.chat_recipients().create(user.id, &body.chat_id).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn delete_chat_recipient(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.db.chat_recipients().delete(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn enable_chat_recipient(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.db.chat_recipients().set_active(id, user.id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn disable_chat_recipient(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.db.chat_recipients().set_active(id, user.id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 503 when `TELEGRAM_BOT_TOKEN` was not configured process-wide; CRUD
/// above works regardless (`spec.md` Sec. 6 env `TELEGRAM_BOT_TOKEN`).
pub async fn test_chat_recipient(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let recipient = state.db.chat_recipients().get(id, Some(user.id)).await?;
    match state.notifier.chat().test(&state.db, &recipient).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(chat::DispatchOutcome::CoolingDown { retry_after_secs }) => {
            Err(ApiError::RateLimited { retry_after_secs })
        }
        Err(chat::DispatchOutcome::NotConfigured) => {
            Err(ApiError::Unavailable("telegram notifier is not configured".into()))
        }
        Err(_) => Err(ApiError::Unavailable("chat delivery failed".into())),
    }
}
