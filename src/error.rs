//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::TransferError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing or invalid X-Request-User-Id header")]
    Unauthenticated,

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    // Engine errors
    #[error(transparent)]
    Transfer(#[from] TransferError),

    // Server errors (5xx)
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    /// HTTP status and stable machine-readable code
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            AppError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "account_not_found"),
            AppError::TransferNotFound(_) => (StatusCode::NOT_FOUND, "transfer_not_found"),

            AppError::Transfer(err) => {
                let status = match err {
                    TransferError::InvalidRequest(_) | TransferError::InsufficientFunds { .. } => {
                        StatusCode::BAD_REQUEST
                    }
                    TransferError::UnknownRecipient(_) => StatusCode::NOT_FOUND,
                    TransferError::IdempotencyConflict(_) => StatusCode::CONFLICT,
                    TransferError::Aborted(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, err.kind().as_str())
            }

            AppError::Store(StoreError::AccountNotFound(_)) => {
                (StatusCode::NOT_FOUND, "account_not_found")
            }
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let details = match &self {
            AppError::InvalidRequest(msg) => Some(msg.clone()),
            AppError::AccountNotFound(id) | AppError::TransferNotFound(id) => Some(id.clone()),
            AppError::Transfer(TransferError::InsufficientFunds {
                required,
                available,
            }) => Some(format!("required {}, available {}", required, available)),
            AppError::Transfer(TransferError::UnknownRecipient(id)) => Some(id.to_string()),
            AppError::Transfer(TransferError::IdempotencyConflict(key)) => Some(key.clone()),
            _ => None,
        };

        // Server-side failures are logged in full and reported generically
        let error = if status.is_server_error() {
            match &self {
                AppError::Transfer(TransferError::Aborted(reason)) => {
                    tracing::warn!("Transfer aborted: {}", reason);
                    "Transfer aborted; no funds were moved and it is safe to retry".to_string()
                }
                other => {
                    tracing::error!("Internal error: {:?}", other);
                    "Internal server error".to_string()
                }
            }
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
