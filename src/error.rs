//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Deliberately uninformative: the same error covers "card does not
    /// exist" and "card belongs to someone else" so callers cannot probe
    /// which card ids exist.
    #[error("Access denied")]
    AccessDenied,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Card not found: {0}")]
    CardNotFound(i64),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Block request not found: {0}")]
    RequestNotFound(i64),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    // Server errors (5xx)
    #[error("Encryption failure: {0}")]
    Encryption(#[from] crate::crypto::CryptoError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            // 403 Forbidden
            AppError::AccessDenied => (StatusCode::FORBIDDEN, "access_denied", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),

            // 404 Not Found
            AppError::CardNotFound(id) => {
                (StatusCode::NOT_FOUND, "card_not_found", Some(id.to_string()))
            }
            AppError::UserNotFound(id) => {
                (StatusCode::NOT_FOUND, "user_not_found", Some(id.to_string()))
            }
            AppError::RequestNotFound(id) => (
                StatusCode::NOT_FOUND,
                "block_request_not_found",
                Some(id.to_string()),
            ),

            // 409 Conflict
            AppError::AlreadyExists(msg) => {
                (StatusCode::CONFLICT, "already_exists", Some(msg.clone()))
            }

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(ref domain_err) => {
                use crate::domain::DomainError;
                match domain_err {
                    DomainError::InsufficientFunds { .. } => (
                        StatusCode::BAD_REQUEST,
                        "insufficient_funds",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::CardNotActive { .. }
                    | DomainError::CardExpired { .. }
                    | DomainError::InvalidTransition { .. }
                    | DomainError::SameCardTransfer
                    | DomainError::InvalidCvv => (
                        StatusCode::BAD_REQUEST,
                        "invalid_operation",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::DuplicatePendingRequest
                    | DomainError::RequestNotPending { .. } => (
                        StatusCode::BAD_REQUEST,
                        "invalid_operation",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::InvalidAmount(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                    }
                }
            }

            // 500 Internal Server Error
            AppError::Encryption(e) => {
                // Indicates data corruption or key misconfiguration, never a
                // normal business condition.
                tracing::error!(error = %e, "Card decryption failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "encryption_failure", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
