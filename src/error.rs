//! Error types for session configuration, persistence, and the HTTP surface.
//!
//! `ConfigError` is fatal and surfaces at startup. `SessionError` comes out
//! of `open`/`save` and is left to the host to act on; the axum binding maps
//! it to a 503 through `AppError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("either SESSION_COOKIE_SECRET_KEY or SECRET_KEY must be set")]
    MissingSecret,

    #[error("SESSION_COOKIE_SALT must be set")]
    MissingSalt,

    #[error("{0} must be set")]
    MissingSetting(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("unknown session backend: {0}")]
    UnknownBackend(String),

    #[error("session backend could not be initialized: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("failed to serialize session: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored session {key} is not a JSON object")]
    CorruptPayload { key: String },
}

/// HTTP-facing errors for the demo routes and the session middleware.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Session backend unavailable")]
    SessionUnavailable(#[from] SessionError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::SessionUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": "Session backend unavailable"}),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({"error": msg})),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": msg}),
            ),
        };

        (status, axum::Json(body)).into_response()
    }
}
