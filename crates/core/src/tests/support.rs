//! Fault-injecting adapters shared by the test suites.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheAdapter, MemoryCacheAdapter};
use crate::config::CoordinatorConfig;
use crate::coordinator::{Coordinator, HealthHandle};
use crate::database::{MemoryRecordStore, RecordStore};
use crate::monitoring::MetricsExporter;
use crate::types::{CacheEntry, CoreError, Record, Result};

pub(crate) struct FlakyCache {
    inner: MemoryCacheAdapter,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    calls: AtomicU64,
}

impl FlakyCache {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryCacheAdapter::new(1024),
            failing: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub(crate) fn inner(&self) -> &MemoryCacheAdapter {
        &self.inner
    }

    async fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let delay = self.delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::Relaxed) {
            return Err(CoreError::CacheError("injected cache failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheAdapter for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.enter().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, version: u64, ttl: Duration) -> Result<bool> {
        self.enter().await?;
        self.inner.set(key, value, version, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.enter().await?;
        self.inner.delete(key).await
    }

    async fn ping(&self) -> Result<()> {
        self.enter().await
    }
}

pub(crate) struct FlakyStore {
    inner: MemoryRecordStore,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    conflicts_left: AtomicU64,
    writes: AtomicU64,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryRecordStore::new(),
            failing: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            conflicts_left: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// The next `n` writes or removes fail with `Conflict`.
    pub(crate) fn inject_conflicts(&self, n: u64) {
        self.conflicts_left.store(n, Ordering::Relaxed);
    }

    pub(crate) fn write_attempts(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    async fn enter(&self) -> Result<()> {
        let delay = self.delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::Relaxed) {
            return Err(CoreError::Unavailable("injected store outage".to_string()));
        }
        Ok(())
    }

    fn take_conflict(&self) -> Result<()> {
        let taken = self
            .conflicts_left
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        match taken {
            Ok(_) => Err(CoreError::Conflict("injected serialization failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn read(&self, key: &str) -> Result<Option<Record>> {
        self.enter().await?;
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, value: Bytes) -> Result<u64> {
        self.enter().await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.take_conflict()?;
        self.inner.write(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.enter().await?;
        self.take_conflict()?;
        self.inner.remove(key).await
    }

    async fn count_by_value(&self, value: &[u8]) -> Result<u64> {
        self.enter().await?;
        self.inner.count_by_value(value).await
    }

    async fn ping(&self) -> Result<()> {
        self.enter().await
    }
}

pub(crate) struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub cache: Arc<FlakyCache>,
    pub store: Arc<FlakyStore>,
    pub health: Arc<HealthHandle>,
    pub metrics: Arc<MetricsExporter>,
}

pub(crate) fn harness() -> Harness {
    harness_with(CoordinatorConfig::default())
}

pub(crate) fn harness_with(config: CoordinatorConfig) -> Harness {
    let cache = Arc::new(FlakyCache::new());
    let store = Arc::new(FlakyStore::new());
    let health = Arc::new(HealthHandle::new());
    let metrics = Arc::new(MetricsExporter::new());
    let coordinator = Arc::new(Coordinator::new(
        cache.clone(),
        store.clone(),
        health.clone(),
        metrics.clone(),
        config,
    ));
    Harness {
        coordinator,
        cache,
        store,
        health,
        metrics,
    }
}
