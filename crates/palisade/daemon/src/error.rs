//! Error types for the palisade daemon.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use palisade_engine::MalformedActionError;
use palisade_ledger::{LedgerError, StoreError};
use palisade_rules::RuleValidationError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("rule load rejected: {0}")]
    Rules(#[from] RuleValidationError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("ledger store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-surface errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Client-input problem; rejected before evaluation, never ledgered.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Rule document rejected; the active rule set stays in force.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<MalformedActionError> for ApiError {
    fn from(err: MalformedActionError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<RuleValidationError> for ApiError {
    fn from(err: RuleValidationError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidRange { .. } => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
