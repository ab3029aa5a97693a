//! Error handling for the inventory service
//!
//! Every failure reaching a client is rendered as
//! `{ "error": { "code", "message", "field"? } }`. Storage errors are mapped
//! to stable codes and never echo driver messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::LedgerError;
use thiserror::Error;

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";
/// Postgres SQLSTATE for query_canceled, raised by statement_timeout
const QUERY_CANCELED: &str = "57014";

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business rule errors
    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // Storage errors
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Storage operation timed out")]
    StorageTimeout,

    #[error("Database error: {0}")]
    DatabaseError(#[source] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether a caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::StorageError(_) | AppError::StorageTimeout
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let resource = match db_err.constraint() {
                    Some("products_sku_key") => "sku",
                    Some("products_unique_key_key") => "unique_key",
                    Some("inventory_ledgers_pkey") => "inventory ledger",
                    _ => "record",
                };
                return AppError::DuplicateEntry(resource.to_string());
            }
            if let Some(mapped) = db_err.code().as_deref().and_then(from_sqlstate) {
                return mapped;
            }
        }
        match err {
            sqlx::Error::PoolTimedOut => AppError::StorageTimeout,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) => AppError::StorageError(err.to_string()),
            other => AppError::DatabaseError(other),
        }
    }
}

/// Map a SQLSTATE by class. Only classes 08, 40 and 53 plus statement
/// timeouts are transient.
fn from_sqlstate(code: &str) -> Option<AppError> {
    if code == QUERY_CANCELED {
        return Some(AppError::StorageTimeout);
    }
    match code.get(..2)? {
        "22" => Some(AppError::ValidationError(
            "A value is out of range or too long to be stored".to_string(),
        )),
        "23" => Some(AppError::ValidationError(
            "The record violates a storage constraint".to_string(),
        )),
        "08" | "40" | "53" => Some(AppError::StorageError(format!("SQLSTATE {}", code))),
        _ => None,
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation { field, message } => AppError::validation(field, message),
            LedgerError::InsufficientStock { requested, available } => AppError::InsufficientStock(format!(
                "requested {}, available {}",
                requested, available
            )),
            LedgerError::InvariantViolation(msg) => AppError::InvariantViolation(msg),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_default();
        AppError::Validation {
            field,
            message: errors.to_string(),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }

    fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, ErrorDetail::new("UNAUTHORIZED", msg.clone())),
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action",
                ),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone()).with_field(field),
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            ),
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                ErrorDetail::new("DUPLICATE_ENTRY", format!("A record with this {} already exists", field))
                    .with_field(field),
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail::new("CONFLICT", message.clone()).with_field(resource),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::InsufficientStock(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("INSUFFICIENT_STOCK", format!("Insufficient stock: {}", msg)),
            ),
            AppError::InvariantViolation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INVARIANT_VIOLATION",
                    "The operation would leave inventory in an inconsistent state",
                ),
            ),
            AppError::StorageError(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new("STORAGE_ERROR", "Storage is temporarily unavailable, please retry"),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A storage operation failed"),
            ),
            AppError::StorageTimeout => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new("STORAGE_TIMEOUT", "Storage did not respond in time, please retry"),
            ),
            AppError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("CONFIGURATION_ERROR", "The server is misconfigured"),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
