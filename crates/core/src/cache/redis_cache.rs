use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::Script;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::CacheAdapter;
use crate::config::RedisConfig;
use crate::types::{CacheEntry, CoreError, Result};

/// 条件写入脚本：缓存中版本更新时拒绝覆盖
const CONDITIONAL_SET_LUA: &str = r#"
local current = redis.call('HGET', KEYS[1], 'v')
if current and tonumber(current) > tonumber(ARGV[1]) then
  return 0
end
redis.call('HSET', KEYS[1], 'v', ARGV[1], 'd', ARGV[2], 'c', ARGV[3])
if tonumber(ARGV[4]) > 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[4])
else
  redis.call('PERSIST', KEYS[1])
end
return 1
"#;

/// Longest TTL handed to PEXPIRE; Redis rejects expiry times that overflow.
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// 可重建的多路复用连接
struct ConnectionSlot {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl ConnectionSlot {
    fn new(client: redis::Client) -> Self {
        Self {
            client,
            connection: Mutex::new(None),
        }
    }

    async fn get(&self) -> Result<MultiplexedConnection> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CoreError::CacheError(format!("Failed to connect to Redis: {}", e)))?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// 连接级错误后丢弃连接，下一次调用重新建立
    async fn reset(&self) {
        self.connection.lock().await.take();
    }
}

/// Redis 缓存适配器
///
/// Each key is a hash with fields `v` (version), `d` (payload) and `c`
/// (CRC32 of the payload).
pub struct RedisCacheAdapter {
    slot: ConnectionSlot,
    key_prefix: String,
    set_script: Script,
}

impl RedisCacheAdapter {
    /// Creates the adapter without touching the network. The first call
    /// (or the first health probe) establishes the connection.
    pub fn new(url: &str, key_prefix: String) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CoreError::ConfigurationError(format!("Invalid Redis URL: {}", e)))?;

        info!("RedisCacheAdapter configured for {} with prefix '{}'", url, key_prefix);

        Ok(Self {
            slot: ConnectionSlot::new(client),
            key_prefix,
            set_script: Script::new(CONDITIONAL_SET_LUA),
        })
    }

    pub fn from_config(config: &RedisConfig) -> Result<Self> {
        Self::new(&config.connection_url(), config.key_prefix.clone())
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn fail(&self, op: &str, key: &str, e: redis::RedisError) -> CoreError {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
            self.slot.reset().await;
        }
        warn!("Redis {} error for key {}: {}", op, key, e);
        CoreError::CacheError(format!("Redis {} failed: {}", op, e))
    }
}

#[async_trait]
impl CacheAdapter for RedisCacheAdapter {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let prefixed = self.prefixed(key);
        let mut conn = self.slot.get().await?;

        let result: redis::RedisResult<((Option<u64>, Option<Vec<u8>>, Option<u32>), i64)> =
            redis::pipe()
                .cmd("HMGET")
                .arg(&prefixed)
                .arg("v")
                .arg("d")
                .arg("c")
                .cmd("PTTL")
                .arg(&prefixed)
                .query_async(&mut conn)
                .await;

        let ((version, data, stored_crc), pttl) = match result {
            Ok(fields) => fields,
            Err(e) => return Err(self.fail("get", key, e).await),
        };

        match (version, data, stored_crc) {
            (Some(version), Some(data), Some(stored_crc)) => {
                let computed_crc = crc32fast::hash(&data);
                if computed_crc != stored_crc {
                    warn!("CRC32 mismatch for key {}, data corrupted", key);
                    return Err(CoreError::CacheError(
                        "CRC32 verification failed".to_string(),
                    ));
                }

                debug!("Redis cache hit for key: {}", key);
                Ok(Some(CacheEntry {
                    key: key.to_string(),
                    value: Bytes::from(data),
                    version,
                    expires_at: expiry_from_pttl(pttl),
                }))
            }
            (None, None, None) => {
                debug!("Redis cache miss for key: {}", key);
                Ok(None)
            }
            _ => {
                warn!("Partial cache entry for key {}", key);
                Err(CoreError::CacheError(format!(
                    "Partial cache entry for key {}",
                    key
                )))
            }
        }
    }

    async fn set(&self, key: &str, value: Bytes, version: u64, ttl: Duration) -> Result<bool> {
        let prefixed = self.prefixed(key);
        let checksum = crc32fast::hash(&value);
        let ttl_ms = ttl_millis(ttl);
        let mut conn = self.slot.get().await?;

        let mut invocation = self.set_script.prepare_invoke();
        invocation
            .key(&prefixed)
            .arg(version)
            .arg(value.as_ref())
            .arg(checksum)
            .arg(ttl_ms);

        let applied: redis::RedisResult<i64> = invocation.invoke_async(&mut conn).await;
        match applied {
            Ok(applied) => {
                debug!(
                    "Redis cache set for key: {} v{} (applied={})",
                    key,
                    version,
                    applied == 1
                );
                Ok(applied == 1)
            }
            Err(e) => Err(self.fail("set", key, e).await),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let prefixed = self.prefixed(key);
        let mut conn = self.slot.get().await?;

        let result: redis::RedisResult<usize> =
            redis::cmd("DEL").arg(&prefixed).query_async(&mut conn).await;
        match result {
            Ok(_) => {
                debug!("Redis cache delete for key: {}", key);
                Ok(())
            }
            Err(e) => Err(self.fail("delete", key, e).await),
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.slot.get().await?;
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        match pong {
            Ok(pong) if pong == "PONG" => Ok(()),
            Ok(other) => Err(CoreError::CacheError(format!(
                "Unexpected PING response: {}",
                other
            ))),
            Err(e) => Err(self.fail("ping", "-", e).await),
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // bounded by MAX_TTL, so the cast cannot truncate
    ttl.min(MAX_TTL).as_millis() as u64
}

/// PTTL: -1 means no expiry, -2 means the key is gone.
fn expiry_from_pttl(pttl: i64) -> Option<Instant> {
    if pttl > 0 {
        Instant::now().checked_add(Duration::from_millis(pttl as u64))
    } else {
        None
    }
}
