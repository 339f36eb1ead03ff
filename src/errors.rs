//! Typed errors for the GearGuard service.
//!
//! Two layers: [`StoreError`] carries persistence failures with domain
//! meaning, and [`ApiError`] is the HTTP taxonomy every handler
//! returns. `StoreError` converts into `ApiError` so handlers can use
//! `?` straight through the store boundary.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A uniqueness or state rule was violated.
    #[error("{0}")]
    Conflict(String),

    /// Input failed a domain check before touching storage.
    #[error("{0}")]
    Invalid(String),

    /// SQLite failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Anything else that should never happen.
    #[error("{0}")]
    Internal(String),
}

/// HTTP-facing error taxonomy. Every variant renders as the failure
/// envelope `{"success": false, "message": ...}` with its status code.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// Duplicate value or a state rule refusing the change.
    #[error("{0}")]
    Conflict(String),

    /// The addressed entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Bad credentials or a missing/invalid/expired token.
    #[error("{0}")]
    Authentication(String),

    /// Unexpected failure; details stay in the log, not the response.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = Json(serde_json::json!({
            "success": false,
            "message": message,
        }));
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Invalid(msg) => ApiError::Validation(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
