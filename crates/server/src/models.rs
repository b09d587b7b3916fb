use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tiergate_core::{
    DependencyState, ErrorKind, MetricsSnapshot, OperationKind, Record, MAX_KEY_LEN,
};
use validator::Validate;

/// `MAX_KEY_LEN` as `u64`, the type the `validator` length bound expects.
const MAX_KEY_LEN_U64: u64 = MAX_KEY_LEN as u64;

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";
pub const STATUS_DEGRADED: &str = "degraded";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PutRequest {
    pub value: String,

    #[validate(range(min = 1))]
    pub ttl_seconds: Option<u64>,
}

/// Normalized operation submitted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExecuteRequest {
    pub operation: OperationKind,

    #[validate(length(min = 1, max = MAX_KEY_LEN_U64))]
    pub key: String,

    pub value: Option<String>,

    #[validate(range(min = 1))]
    pub ttl_seconds: Option<u64>,

    /// Overrides the `x-request-timeout-ms` header when present.
    #[validate(range(min = 1))]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountQuery {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub status: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RecordResponse {
    pub fn from_record(record: Record) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            value: Some(String::from_utf8_lossy(&record.value).into_owned()),
            version: Some(record.version),
            updated_at: Some(record.updated_at),
            key: record.key,
        }
    }

    pub fn deleted(key: String) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            key,
            value: None,
            version: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountResponse {
    pub status: String,
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub cache: DependencyState,
    pub durable_store: DependencyState,
    pub checked_at: Option<DateTime<Utc>>,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_kind: ErrorKind, message: String) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            error_kind,
            message,
        }
    }
}
