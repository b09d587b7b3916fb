use crate::models::{CountResponse, ExecuteRequest, HealthResponse, PutRequest, RecordResponse};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tiergate_core::{CoreError, Coordinator, Operation, OperationKind, OperationOutput, Result};

use crate::models::{STATUS_DEGRADED, STATUS_OK};

/// Translates front-end requests into coordinator operations.
pub struct ApiHandlers {
    coordinator: Arc<Coordinator>,
}

impl ApiHandlers {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Timeout for a request that did not carry its own.
    pub fn default_timeout(&self) -> Duration {
        self.coordinator.config().request_timeout()
    }

    pub async fn get(&self, key: String, timeout: Duration) -> Result<RecordResponse> {
        let operation = Operation::get(key).with_timeout(timeout);
        self.run(operation).await
    }

    pub async fn put(
        &self,
        key: String,
        req: PutRequest,
        timeout: Duration,
    ) -> Result<RecordResponse> {
        let mut operation = Operation::put(key, Bytes::from(req.value)).with_timeout(timeout);
        if let Some(ttl) = req.ttl_seconds {
            operation = operation.with_ttl(Duration::from_secs(ttl));
        }
        self.run(operation).await
    }

    pub async fn delete(&self, key: String, timeout: Duration) -> Result<RecordResponse> {
        let operation = Operation::delete(key).with_timeout(timeout);
        self.run(operation).await
    }

    pub async fn execute(&self, req: ExecuteRequest, timeout: Duration) -> Result<RecordResponse> {
        let timeout = req.timeout_ms.map(Duration::from_millis).unwrap_or(timeout);

        let mut operation = match (req.operation, req.value) {
            (OperationKind::Put, Some(value)) => Operation::put(req.key, Bytes::from(value)),
            (OperationKind::Put, None) => {
                return Err(CoreError::InvalidInput("put requires a value".to_string()))
            }
            (OperationKind::Get, None) => Operation::get(req.key),
            (OperationKind::Delete, None) => Operation::delete(req.key),
            (kind, Some(_)) => {
                return Err(CoreError::InvalidInput(format!(
                    "{} does not take a value",
                    kind
                )))
            }
        };
        if let Some(ttl) = req.ttl_seconds {
            operation = operation.with_ttl(Duration::from_secs(ttl));
        }

        self.run(operation.with_timeout(timeout)).await
    }

    pub async fn count(&self, value: String) -> Result<CountResponse> {
        let count = self.coordinator.count_equal(value.as_bytes()).await?;
        Ok(CountResponse {
            status: STATUS_OK.to_string(),
            value,
            count,
        })
    }

    pub fn health(&self) -> HealthResponse {
        let snapshot = self.coordinator.health().snapshot();
        let status = if snapshot.is_healthy() {
            STATUS_OK
        } else {
            STATUS_DEGRADED
        };

        HealthResponse {
            status: status.to_string(),
            cache: snapshot.cache,
            durable_store: snapshot.durable_store,
            checked_at: snapshot.checked_at,
            metrics: self.coordinator.metrics().snapshot(),
        }
    }

    async fn run(&self, operation: Operation) -> Result<RecordResponse> {
        let key = operation.key.clone();
        match self.coordinator.execute(operation).await? {
            OperationOutput::Record(record) => Ok(RecordResponse::from_record(record)),
            OperationOutput::Deleted => Ok(RecordResponse::deleted(key)),
        }
    }
}
