use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// How a provider failure should be recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credentials rejected; the user has to authorize again.
    Auth,
    /// Transient; retry later with the same credentials.
    RateLimit,
    /// Provider refused the operation (e.g. missing scope). Not retryable.
    Application,
    /// Transport, timeout, serialization or store failure.
    Internal,
}

/// A classified failure talking to the music provider.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct SpotifyError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SpotifyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Application, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<reqwest::Error> for SpotifyError {
    fn from(err: reqwest::Error) -> Self {
        SpotifyError::internal(err.to_string())
    }
}

/// Structured body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl ApiResponse {
    pub fn new(status: StatusCode, message: impl Into<String>, data: Value) -> Self {
        Self {
            status: status.as_u16(),
            success: status.is_success(),
            message: message.into(),
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self::new(StatusCode::OK, message, data)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

const GENERIC_FAILURE: &str = "Something went wrong, please try again";

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    /// The stored credentials are no longer accepted; `url` restarts authorization.
    ReauthorizationRequired { url: String },
    /// Detail is logged where the failure happened, never returned.
    Internal,
}

impl From<SpotifyError> for AppError {
    fn from(err: SpotifyError) -> Self {
        match err.kind {
            ErrorKind::Auth => AppError::BadRequest(err.message),
            ErrorKind::RateLimit | ErrorKind::Application | ErrorKind::Internal => {
                AppError::Internal
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, data) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, json!({})),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, json!({})),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "Not found".to_string(),
                json!({ "error": msg }),
            ),
            AppError::ReauthorizationRequired { url } => (
                StatusCode::IM_A_TEAPOT,
                "Re-authorization required".to_string(),
                json!({ "url": url }),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                GENERIC_FAILURE.to_string(),
                json!({}),
            ),
        };
        ApiResponse::new(status, message, data).into_response()
    }
}
