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

mod memory_cache;
mod redis_cache;


use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::types::{CacheEntry, Result};

pub use memory_cache::MemoryCacheAdapter;
pub use redis_cache::RedisCacheAdapter;

/// Volatile key/value tier.
///
/// Every call is idempotent. Implementations own TTL expiry and eviction;
/// callers bound each call with their own timeout and must tolerate entries
/// disappearing without notice.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Stores `value` at `version` unless the entry already holds a newer
    /// version. Returns whether the write was applied.
    async fn set(&self, key: &str, value: Bytes, version: u64, ttl: Duration) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Cheap liveness probe used by the health monitor.
    async fn ping(&self) -> Result<()>;
}
