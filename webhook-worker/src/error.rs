//! Error types for the webhook subsystem.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors raised by validation, persistence and the admin API.
///
/// Delivery failures are not errors at this level: they are recorded on the
/// delivery row (see [`crate::delivery::DeliveryError`]).
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unknown event type: {0}")]
    UnknownEvent(String),

    #[error("Header {0} is reserved and cannot be overridden")]
    ReservedHeader(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Webhook {0} not found")]
    WebhookNotFound(u64),

    #[error("Delivery {0} not found")]
    DeliveryNotFound(u64),

    #[error("Delivery {0} already reached a terminal state")]
    AlreadyFinalized(u64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body returned by the HTTP endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
}

impl WebhookError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            WebhookError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "invalid_url"),
            WebhookError::UnknownEvent(_) => (StatusCode::BAD_REQUEST, "unknown_event"),
            WebhookError::ReservedHeader(_) => (StatusCode::BAD_REQUEST, "reserved_header"),
            WebhookError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            WebhookError::WebhookNotFound(_) => (StatusCode::NOT_FOUND, "webhook_not_found"),
            WebhookError::DeliveryNotFound(_) => (StatusCode::NOT_FOUND, "delivery_not_found"),
            WebhookError::AlreadyFinalized(_) => (StatusCode::CONFLICT, "already_finalized"),
            WebhookError::Storage(_) | WebhookError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
            WebhookError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error")
            }
            WebhookError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            WebhookError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        let body = ErrorResponse {
            error: kind.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebhookError>;
