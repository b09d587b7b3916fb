// Copyright © 2026 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Read/write protocol across the cache tier and the durable tier.
//!
//! The durable store is the source of truth. Puts and deletes commit there
//! first and only then touch the cache; cache failures are logged, counted and
//! reported to the health monitor but never change the result of a call.

mod health_monitor;

pub use health_monitor::{HealthHandle, HealthMonitor, HealthSnapshot, HealthStateMachine};

use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, error, warn};

use crate::cache::CacheAdapter;
use crate::config::CoordinatorConfig;
use crate::database::RecordStore;
use crate::monitoring::{MetricsExporter, Outcome};
use crate::types::{
    CacheEntry, CoreError, Dependency, ErrorKind, Operation, OperationKind, OperationOutput,
    Record, Result,
};

const COUNT_OPERATION: &str = "count";

pub struct Coordinator {
    cache: Arc<dyn CacheAdapter>,
    store: Arc<dyn RecordStore>,
    health: Arc<HealthHandle>,
    metrics: Arc<MetricsExporter>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        cache: Arc<dyn CacheAdapter>,
        store: Arc<dyn RecordStore>,
        health: Arc<HealthHandle>,
        metrics: Arc<MetricsExporter>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            cache,
            store,
            health,
            metrics,
            config,
        }
    }

    pub fn health(&self) -> &Arc<HealthHandle> {
        &self.health
    }

    pub fn metrics(&self) -> &Arc<MetricsExporter> {
        &self.metrics
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Runs one operation. When the operation carries a deadline the whole
    /// call, retries included, is abandoned with `Timeout` once it passes.
    pub async fn execute(&self, operation: Operation) -> Result<OperationOutput> {
        let started = Instant::now();
        let kind = operation.kind;

        let result = match operation.validate() {
            Ok(()) => match operation.deadline {
                Some(deadline) if deadline <= started => {
                    warn!("{} arrived after its deadline", kind);
                    Err(CoreError::Timeout)
                }
                Some(deadline) => {
                    let deadline = time::Instant::from_std(deadline);
                    match time::timeout_at(deadline, self.dispatch(operation)).await {
                        Ok(result) => result,
                        Err(_) => {
                            warn!("{} exceeded its deadline", kind);
                            Err(CoreError::Timeout)
                        }
                    }
                }
                None => self.dispatch(operation).await,
            },
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok((_, outcome)) => *outcome,
            Err(_) => Outcome::Failure,
        };
        self.metrics
            .record_operation(kind.as_str(), outcome, started.elapsed());

        result.map(|(output, _)| output)
    }

    pub async fn get(&self, key: &str) -> Result<Record> {
        self.execute(Operation::get(key))
            .await?
            .into_record()
            .ok_or_else(|| CoreError::InternalError("get returned no record".to_string()))
    }

    pub async fn put(&self, key: &str, value: impl Into<Bytes>) -> Result<Record> {
        self.execute(Operation::put(key, value))
            .await?
            .into_record()
            .ok_or_else(|| CoreError::InternalError("put returned no record".to_string()))
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.execute(Operation::delete(key)).await.map(|_| ())
    }

    /// Number of records holding exactly `value`. Always answered by the
    /// durable store.
    pub async fn count_equal(&self, value: &[u8]) -> Result<u64> {
        let started = Instant::now();
        let result = match self.ensure_store_reachable() {
            Ok(()) => self.store_call(self.store.count_by_value(value)).await,
            Err(e) => Err(e),
        };

        let outcome = if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        self.metrics
            .record_operation(COUNT_OPERATION, outcome, started.elapsed());
        result
    }

    async fn dispatch(&self, operation: Operation) -> Result<(OperationOutput, Outcome)> {
        let Operation {
            kind,
            key,
            value,
            ttl,
            ..
        } = operation;

        match kind {
            OperationKind::Get => {
                let (record, outcome) = self.handle_get(&key).await?;
                Ok((OperationOutput::Record(record), outcome))
            }
            OperationKind::Put => {
                let value = value.ok_or_else(|| {
                    CoreError::InvalidInput("put requires a value".to_string())
                })?;
                let record = self.handle_put(&key, value, ttl).await?;
                Ok((OperationOutput::Record(record), Outcome::Success))
            }
            OperationKind::Delete => {
                self.handle_delete(&key).await?;
                Ok((OperationOutput::Deleted, Outcome::Success))
            }
        }
    }

    async fn handle_get(&self, key: &str) -> Result<(Record, Outcome)> {
        let cache_reachable = self.health.state(Dependency::Cache).is_reachable();

        if cache_reachable {
            if let Some(entry) = self.cache_get(key).await {
                debug!("Cache hit for key: {} v{}", key, entry.version);
                return Ok((entry.into_record(), Outcome::Hit));
            }
        }

        self.ensure_store_reachable()?;
        let record = self
            .store_call(self.store.read(key))
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Key {} not found", key)))?;
        debug!("Cache miss for key: {}, loaded v{} from store", key, record.version);

        if cache_reachable
            && self
                .cache_set(OperationKind::Get, &record, self.config.default_ttl())
                .await
        {
            self.verify_fill(&record).await;
        }
        Ok((record, Outcome::Miss))
    }

    /// A Delete that committed between the store read and the fill would
    /// leave the filled copy cached until its TTL. Re-read and drop the copy
    /// unless the store still holds that version.
    async fn verify_fill(&self, record: &Record) {
        let current = self.store_call(self.store.read(&record.key)).await;
        if !matches!(&current, Ok(Some(r)) if r.version == record.version) {
            debug!(
                "Record {} changed during fill of v{}, dropping cached copy",
                record.key, record.version
            );
            self.cache_invalidate(OperationKind::Get, &record.key).await;
        }
    }

    async fn handle_put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<Record> {
        self.ensure_store_reachable()?;

        let payload = value.clone();
        let version = self
            .with_conflict_retries(OperationKind::Put, move || {
                self.store_call(self.store.write(key, payload.clone()))
            })
            .await?;
        let record = Record::new(key, value, version);

        if self.health.state(Dependency::Cache).is_reachable() {
            let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
            if !self.cache_set(OperationKind::Put, &record, ttl).await {
                // an older copy may still be cached
                self.cache_invalidate(OperationKind::Put, key).await;
            }
        } else {
            // no write-through, but a copy cached before the outage must not
            // be served once the cache is back
            self.cache_invalidate(OperationKind::Put, key).await;
        }
        Ok(record)
    }

    async fn handle_delete(&self, key: &str) -> Result<()> {
        self.ensure_store_reachable()?;

        let removed = self
            .with_conflict_retries(OperationKind::Delete, move || {
                self.store_call(self.store.remove(key))
            })
            .await;

        // also for NotFound: a leftover entry must not outlive the record.
        // Attempted even while the cache is unreachable.
        if matches!(&removed, Ok(()) | Err(CoreError::NotFound(_))) {
            self.cache_invalidate(OperationKind::Delete, key).await;
        }
        removed
    }

    fn ensure_store_reachable(&self) -> Result<()> {
        if self.health.state(Dependency::DurableStore).is_reachable() {
            Ok(())
        } else {
            Err(CoreError::Unavailable(
                "Durable store is unreachable".to_string(),
            ))
        }
    }

    async fn with_conflict_retries<T, F, Fut>(&self, kind: OperationKind, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_conflict() && retries < self.config.max_conflict_retries => {
                    retries += 1;
                    self.metrics.record_conflict_retry(kind.as_str());
                    debug!("{} conflict, retry {}: {}", kind, retries, e);
                }
                result => return result,
            }
        }
    }

    async fn store_call<T, Fut>(&self, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let result = match time::timeout(self.config.store_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Unavailable(format!(
                "Durable store did not answer within {:?}",
                self.config.store_timeout()
            ))),
        };

        if let Err(e) = &result {
            if e.kind() == ErrorKind::Unavailable || e.kind() == ErrorKind::Internal {
                error!("Durable store call failed: {}", e);
                self.health.report_error(Dependency::DurableStore);
            }
        }
        result
    }

    async fn cache_get(&self, key: &str) -> Option<CacheEntry> {
        match time::timeout(self.config.cache_timeout(), self.cache.get(key)).await {
            Ok(Ok(entry)) => entry,
            Ok(Err(e)) => {
                self.absorb(OperationKind::Get, "get", key, &e);
                None
            }
            Err(_) => {
                self.absorb(OperationKind::Get, "get", key, &CoreError::Timeout);
                None
            }
        }
    }

    /// Returns false when the write did not reach the cache.
    async fn cache_set(&self, kind: OperationKind, record: &Record, ttl: Duration) -> bool {
        let set = self
            .cache
            .set(&record.key, record.value.clone(), record.version, ttl);
        match time::timeout(self.config.cache_timeout(), set).await {
            Ok(Ok(applied)) => {
                if !applied {
                    debug!(
                        "Cache kept a newer copy of {} than v{}",
                        record.key, record.version
                    );
                }
                true
            }
            Ok(Err(e)) => {
                self.absorb(kind, "set", &record.key, &e);
                false
            }
            Err(_) => {
                self.absorb(kind, "set", &record.key, &CoreError::Timeout);
                false
            }
        }
    }

    async fn cache_invalidate(&self, kind: OperationKind, key: &str) {
        match time::timeout(self.config.cache_timeout(), self.cache.delete(key)).await {
            Ok(Ok(())) => debug!("Invalidated cache entry for key: {}", key),
            Ok(Err(e)) => self.absorb(kind, "delete", key, &e),
            Err(_) => self.absorb(kind, "delete", key, &CoreError::Timeout),
        }
    }

    fn absorb(&self, kind: OperationKind, call: &str, key: &str, e: &CoreError) {
        warn!("Cache {} for key {} failed during {}: {}", call, key, kind, e);
        self.metrics.record_absorbed_cache_error(kind.as_str());
        self.health.report_error(Dependency::Cache);
    }
}
