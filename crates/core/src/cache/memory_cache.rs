use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::cache::CacheAdapter;
use crate::types::{CacheEntry, Result};

/// In-process cache bounded by an LRU capacity.
pub struct MemoryCacheAdapter {
    entries: Mutex<LruCache<String, CacheEntry>>,
    evictions: AtomicU64,
}

impl MemoryCacheAdapter {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            evictions: AtomicU64::new(0),
        }
    }

    /// Drops an entry without going through the coordinator, as an
    /// eviction or a cache restart would.
    pub fn evict(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Raw view of the stored entry, expired or not.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().peek(key).cloned()
    }
}

impl Default for MemoryCacheAdapter {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheAdapter for MemoryCacheAdapter {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            debug!("Memory cache entry expired for key: {}", key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, version: u64, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if let Some(existing) = entries.peek(key) {
            if !existing.is_expired(now) && existing.version > version {
                debug!(
                    "Skipping stale cache fill for key {}: cached v{} > v{}",
                    key, existing.version, version
                );
                return Ok(false);
            }
        }

        let entry = CacheEntry {
            key: key.to_string(),
            value,
            version,
            // a TTL past the end of the clock never expires
            expires_at: if ttl.is_zero() {
                None
            } else {
                now.checked_add(ttl)
            },
        };

        if let Some((evicted_key, _)) = entries.push(key.to_string(), entry) {
            if evicted_key != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().pop(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
