//! Unified error handling for the HTTP surface.
//!
//! Generalizes the teacher's `HandlerError` → IRC-numeric-reply mapping
//! into an `ApiError` → HTTP-status-and-JSON-body mapping: one error
//! hierarchy, one place that decides what the client sees.

use crate::db::DbError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors returned by services, surfaced to HTTP clients per `spec.md`
/// Sec. 7. Every variant carries a client-safe message; anything that
/// shouldn't be client-visible must be logged before being converted into
/// one of these (e.g. `Unauthorized` never says *why*).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Invalid(String),
    #[error("invalid credentials")]
    Unauthorized,
    #[error("forbidden")]
    #[allow(dead_code)]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("rate limited")]
    RateLimited { retry_after_secs: i64 },
    #[error("internal server error")]
    Internal,
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Invalid(_) => "invalid",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Internal => "internal",
            ApiError::Unavailable(_) => "unavailable",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Invalid(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self
            && let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.max(0).to_string())
        {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
        }
        response
    }
}

/// Ownership mismatches surface as `NotFound`, never `Forbidden`, so
/// existence of other users' resources is never leaked (`spec.md` Sec. 7).
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => ApiError::NotFound,
            DbError::Conflict(msg) => ApiError::Conflict(msg),
            DbError::Invalid(msg) => ApiError::Invalid(msg),
            DbError::Sqlx(e) => {
                tracing::error!(error = %e, "database error");
                ApiError::Internal
            }
            DbError::Migration(e) => {
                tracing::error!(error = %e, "migration error");
                ApiError::Internal
            }
            DbError::Internal(msg) => {
                tracing::error!(error = %msg, "internal storage error");
                ApiError::Internal
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_404() {
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn db_not_found_maps_to_api_not_found() {
        assert!(matches!(ApiError::from(DbError::NotFound), ApiError::NotFound));
    }

    #[test]
    fn db_conflict_maps_to_api_conflict() {
        assert!(matches!(
            ApiError::from(DbError::Conflict("dup".into())),
            ApiError::Conflict(_)
        ));
    }
}
