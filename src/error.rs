use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::models::TransactionStatus;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Sweep error: {0}")]
    Sweep(#[from] SweepError),

    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("External error: {0}")]
    ExternalError(String),
}

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum SweepError {
    /// The ledger could not be queried at all. Fatal for the run.
    #[error("Ledger store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Join data missing for transaction {0}")]
    JoinDataMissing(Uuid),

    #[error("Transition {from:?} -> {to:?} is not allowed")]
    TransitionRejected {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Transaction {0} vanished before it could be resolved")]
    RecordNotFound(Uuid),

    #[error("Audit write failed for transaction {id}: {message}")]
    AuditWriteFailed { id: Uuid, message: String },
}

/// Failures talking to the certificate authority.
///
/// None of these is evidence that a resource is absent.
#[derive(Error, Debug, Clone)]
pub enum VerificationError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authority responded {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("{call} timed out after {after_ms}ms")]
    Timeout { call: &'static str, after_ms: u64 },

    #[error("Unexpected authority response: {0}")]
    Decode(String),
}

impl VerificationError {
    /// Whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            VerificationError::Transport(_) | VerificationError::Timeout { .. } => true,
            VerificationError::Remote { status, .. } => *status == 429 || *status >= 500,
            VerificationError::Decode(_) => false,
        }
    }
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing or invalid bearer token".to_string(),
                None,
            ),
            AppError::Sweep(SweepError::StoreUnavailable(reason)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_UNAVAILABLE",
                "Ledger store is unavailable, sweep aborted".to_string(),
                Some(serde_json::json!({ "reason": reason })),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                None,
            ),
            AppError::Config(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                message,
                None,
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::ExternalError(format!("HTTP request error: {:?}", error))
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
