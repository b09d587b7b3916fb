use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error taxonomy returned to callers of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[display("unavailable")]
    Unavailable,
    #[display("conflict")]
    Conflict,
    #[display("not_found")]
    NotFound,
    #[display("timeout")]
    Timeout,
    #[display("invalid_input")]
    InvalidInput,
    #[display("internal")]
    Internal,
}

#[derive(Debug, Error, Display, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[display("Dependency unavailable: {}", _0)]
    Unavailable(String),

    #[display("Write conflict: {}", _0)]
    Conflict(String),

    #[display("Key not found: {}", _0)]
    NotFound(String),

    #[display("Deadline exceeded")]
    Timeout,

    #[display("Invalid input: {}", _0)]
    InvalidInput(String),

    #[display("Cache error: {}", _0)]
    CacheError(String),

    #[display("Configuration error: {}", _0)]
    ConfigurationError(String),

    #[display("Internal error: {}", _0)]
    InternalError(String),
}

impl CoreError {
    /// Collapses adapter-level detail into the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Unavailable(_) | CoreError::CacheError(_) => ErrorKind::Unavailable,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Timeout => ErrorKind::Timeout,
            CoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            CoreError::ConfigurationError(_) | CoreError::InternalError(_) => ErrorKind::Internal,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::Conflict(_))
    }

    /// HTTP status code and body for the front-end.
    pub fn to_http_response(&self) -> (u16, ErrorResponse) {
        let code = match self.kind() {
            ErrorKind::InvalidInput => ERROR_CODE_INVALID_REQUEST,
            ErrorKind::NotFound => ERROR_CODE_NOT_FOUND,
            ErrorKind::Conflict => ERROR_CODE_CONFLICT,
            ErrorKind::Unavailable => ERROR_CODE_SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => ERROR_CODE_GATEWAY_TIMEOUT,
            ErrorKind::Internal => ERROR_CODE_INTERNAL_ERROR,
        };
        (code, ErrorResponse::new(code, self.kind(), self.to_string()))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::InternalError(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for CoreError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CoreError::Timeout
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: u16, error_kind: ErrorKind, message: String) -> Self {
        Self {
            code,
            error_kind,
            message,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

pub const ERROR_CODE_INVALID_REQUEST: u16 = 400;
pub const ERROR_CODE_NOT_FOUND: u16 = 404;
pub const ERROR_CODE_CONFLICT: u16 = 409;
pub const ERROR_CODE_INTERNAL_ERROR: u16 = 500;
pub const ERROR_CODE_SERVICE_UNAVAILABLE: u16 = 503;
pub const ERROR_CODE_GATEWAY_TIMEOUT: u16 = 504;
