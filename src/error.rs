//! Error types for chatrelay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type alias for chatrelay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that reach the caller of the dispatcher or the HTTP front end.
///
/// Failures inside a single upstream call never show up here; they are
/// folded into a failed [`ChatOutcome`](crate::proxy::ChatOutcome).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("No endpoints registered")]
    NoEndpoints,

    #[error("Invalid endpoint selection: index {index} is out of range (0..{count})")]
    InvalidEndpoint { index: usize, count: usize },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NoEndpoints => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidEndpoint { .. } => StatusCode::BAD_REQUEST,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Return OpenAI-compatible error format
        let body = serde_json::json!({
            "error": {
                "message": self.to_string(),
                "type": "chatrelay_error",
                "code": status.as_u16()
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Why a single upstream call failed.
///
/// Only ever rendered into a failed outcome's message.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("Upstream returned {status}: {body}")]
    UpstreamHttp {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to reach upstream: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Upstream stream failed: {0}")]
    Body(#[source] reqwest::Error),

    #[error("Upstream call timed out after {0:?}")]
    Timeout(std::time::Duration),
}
