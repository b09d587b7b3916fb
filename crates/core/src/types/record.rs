use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::types::{CoreError, Result};

/// Longest key accepted by either tier.
pub const MAX_KEY_LEN: usize = 512;

/// Durable record. The durable store owns it; the cache only holds copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: Bytes,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>, version: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            version,
            updated_at: Utc::now(),
        }
    }
}

/// Cached copy of a record. May vanish at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Bytes,
    pub version: u64,
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Cache hits carry no `updated_at`; the fill time stands in for it.
    pub fn into_record(self) -> Record {
        Record {
            key: self.key,
            value: self.value,
            version: self.version,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Get,
    Put,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Get => "get",
            OperationKind::Put => "put",
            OperationKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized request handed over by the front-end. Consumed once.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub key: String,
    pub value: Option<Bytes>,
    pub ttl: Option<Duration>,
    pub deadline: Option<Instant>,
}

impl Operation {
    pub fn get(key: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Get,
            key: key.into(),
            value: None,
            ttl: None,
            deadline: None,
        }
    }

    pub fn put(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            kind: OperationKind::Put,
            key: key.into(),
            value: Some(value.into()),
            ttl: None,
            deadline: None,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Delete,
            key: key.into(),
            value: None,
            ttl: None,
            deadline: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// A timeout too large to express as an `Instant` leaves the operation
    /// without a deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_key(&self.key)?;
        match (self.kind, &self.value) {
            (OperationKind::Put, None) => Err(CoreError::InvalidInput(
                "put requires a value".to_string(),
            )),
            (OperationKind::Get | OperationKind::Delete, Some(_)) => Err(CoreError::InvalidInput(
                format!("{} does not take a value", self.kind),
            )),
            _ => Ok(()),
        }?;
        if self.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(CoreError::InvalidInput("ttl must be positive".to_string()));
        }
        Ok(())
    }
}

pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CoreError::InvalidInput("key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(CoreError::InvalidInput(format!(
            "key exceeds {} bytes",
            MAX_KEY_LEN
        )));
    }
    Ok(())
}

/// Result of a successful `execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutput {
    Record(Record),
    Deleted,
}

impl OperationOutput {
    pub fn into_record(self) -> Option<Record> {
        match self {
            OperationOutput::Record(record) => Some(record),
            OperationOutput::Deleted => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    Cache,
    DurableStore,
}

impl Dependency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Cache => "cache",
            Dependency::DurableStore => "durable_store",
        }
    }
}

/// Liveness state published by the health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependencyState {
    #[default]
    Healthy,
    Degraded,
    Unreachable,
}

impl DependencyState {
    pub fn is_reachable(&self) -> bool {
        !matches!(self, DependencyState::Unreachable)
    }

    /// Gauge encoding: 0 healthy, 1 degraded, 2 unreachable.
    pub fn as_gauge(&self) -> i64 {
        match self {
            DependencyState::Healthy => 0,
            DependencyState::Degraded => 1,
            DependencyState::Unreachable => 2,
        }
    }
}

impl std::fmt::Display for DependencyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyState::Healthy => write!(f, "healthy"),
            DependencyState::Degraded => write!(f, "degraded"),
            DependencyState::Unreachable => write!(f, "unreachable"),
        }
    }
}
