//! # Redis Cache Store
//!
//! Redis-backed store. Expiry is delegated to Redis (`SET ... EX`), so entries vanish
//! on their own once the TTL elapses.
//!
//! One `ConnectionManager` is created at startup and shared for the life of the
//! process. It multiplexes commands over a single connection and reconnects on its
//! own, so callers clone it per command instead of taking a lock.

use super::{CacheStore, CacheStoreStats};
use crate::caching::{CacheError, CacheResult};
use crate::core::config::RedisCacheConfig;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Redis cache implementation
pub struct RedisCache {
    /// Configuration
    config: RedisCacheConfig,

    /// Redis connection manager
    connection_manager: ConnectionManager,

    /// Statistics counters
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RedisCache {
    /// Connect to Redis, giving up after `connection_timeout`
    pub async fn new(config: RedisCacheConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())?;

        let connection_manager = tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout)??;

        info!("Redis cache connected to {}", config.url);

        Ok(Self {
            config,
            connection_manager,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Get the full cache key with prefix
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn connection(&self) -> ConnectionManager {
        self.connection_manager.clone()
    }
}

/// Redis expiry has whole-second granularity; never send `EX 0`
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let full_key = self.full_key(key);
        let mut conn = self.connection();

        let value: Option<Vec<u8>> = conn.get(&full_key).await?;

        match value {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Redis cache hit for key: {}", key);
                Ok(Some(value))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Redis cache miss for key: {}", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let full_key = self.full_key(key);
        let mut conn = self.connection();

        redis::cmd("SET")
            .arg(&full_key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!("Set Redis cache key: {} with TTL: {:?}", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let full_key = self.full_key(key);
        let mut conn = self.connection();

        let deleted_count: i64 = conn.del(&full_key).await?;
        Ok(deleted_count > 0)
    }

    async fn stats(&self) -> CacheResult<CacheStoreStats> {
        let mut conn = self.connection();

        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await
            .unwrap_or_default();

        let memory_usage = info
            .lines()
            .find(|line| line.starts_with("used_memory:"))
            .and_then(|line| line.split(':').nth(1))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let entries: usize = redis::cmd("DBSIZE")
            .query_async(&mut conn)
            .await
            .unwrap_or(0);

        Ok(CacheStoreStats {
            entries,
            memory_usage,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: 0,
            expired_cleanups: 0,
        })
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.connection();
        let result = redis::cmd("PING").query_async::<_, String>(&mut conn).await;

        match result {
            Ok(response) => Ok(response == "PONG"),
            Err(_) => Ok(false),
        }
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
