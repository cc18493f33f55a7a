use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::payments::GatewayError;
use crate::sync::SyncError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Payment required: {0}")]
    PaymentRequired(String),
    #[error("Upstream error: {0}")]
    BadGateway(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::PaymentRequired(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({ "error": error_message }))).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Router(e) => AppError::BadGateway(e.to_string()),
            SyncError::Database(e) => {
                error!(error = %e, "Database error while handling request.");
                AppError::InternalServerError("database error".to_string())
            }
            e @ SyncError::NotFound { .. } => AppError::NotFound(e.to_string()),
            SyncError::Reference(msg) | SyncError::Invalid(msg) => AppError::InvalidInput(msg),
            SyncError::Conflict(msg) => AppError::Conflict(msg),
            e @ SyncError::AlreadyRunning => AppError::Conflict(e.to_string()),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidAmount(msg) => AppError::InvalidInput(msg),
            other => {
                error!(error = %other, "Payment gateway call failed.");
                AppError::BadGateway("payment gateway unavailable".to_string())
            }
        }
    }
}
