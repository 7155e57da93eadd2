//! # In-Memory Cache Store
//!
//! Process-local cache with TTL support, least-recently-used eviction once the entry
//! limit is reached, and a background task that sweeps expired entries.

use super::{CacheEntry, CacheStore, CacheStoreStats};
use crate::caching::CacheResult;
use crate::core::config::InMemoryCacheConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

/// In-memory cache implementation
pub struct InMemoryCache {
    /// Configuration
    config: InMemoryCacheConfig,

    /// Cache entries storage
    entries: Arc<DashMap<String, CacheEntry>>,

    /// Atomic counters for statistics
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_cleanups: Arc<AtomicU64>,

    /// Current memory usage estimate
    memory_usage: Arc<AtomicUsize>,

    /// Cleanup task handle, aborted on drop
    cleanup_task: JoinHandle<()>,
}

impl InMemoryCache {
    /// Create a new in-memory cache. Must be called from within a Tokio runtime.
    pub fn new(config: InMemoryCacheConfig) -> CacheResult<Self> {
        let entries = Arc::new(DashMap::new());
        let expired_cleanups = Arc::new(AtomicU64::new(0));
        let memory_usage = Arc::new(AtomicUsize::new(0));

        let cleanup_task = {
            let entries = entries.clone();
            let expired_cleanups = expired_cleanups.clone();
            let memory_usage = memory_usage.clone();
            let cleanup_interval = config.cleanup_interval;

            tokio::spawn(async move {
                let mut interval = interval(cleanup_interval);
                loop {
                    interval.tick().await;
                    Self::cleanup_expired_entries(&entries, &expired_cleanups, &memory_usage);
                }
            })
        };

        Ok(Self {
            config,
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired_cleanups,
            memory_usage,
            cleanup_task,
        })
    }

    /// Cleanup expired entries
    fn cleanup_expired_entries(
        entries: &DashMap<String, CacheEntry>,
        expired_cleanups: &AtomicU64,
        memory_usage: &AtomicUsize,
    ) {
        let expired_keys: Vec<String> = entries
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        let mut cleaned_count = 0;
        let mut freed_memory = 0;

        for key in expired_keys {
            if let Some((_, entry)) = entries.remove_if(&key, |_, entry| entry.is_expired()) {
                freed_memory += entry.size();
                cleaned_count += 1;
            }
        }

        if cleaned_count > 0 {
            memory_usage.fetch_sub(freed_memory, Ordering::Relaxed);
            expired_cleanups.fetch_add(cleaned_count, Ordering::Relaxed);
            debug!("Cleaned up {} expired cache entries, freed {} bytes", cleaned_count, freed_memory);
        }
    }

    /// Make room for one new key by dropping expired entries first, then the
    /// least recently used ones.
    fn evict_if_needed(&self, incoming_key: &str) {
        if self.entries.len() < self.config.max_entries || self.entries.contains_key(incoming_key) {
            return;
        }

        Self::cleanup_expired_entries(&self.entries, &self.expired_cleanups, &self.memory_usage);

        let overflow = (self.entries.len() + 1).saturating_sub(self.config.max_entries);
        if overflow == 0 {
            return;
        }

        let mut by_access: Vec<(String, tokio::time::Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_accessed))
            .collect();
        by_access.sort_by_key(|(_, accessed)| *accessed);

        let mut evicted_count = 0;
        let mut freed_memory = 0;
        for (key, _) in by_access.into_iter().take(overflow) {
            if let Some((_, entry)) = self.entries.remove(&key) {
                freed_memory += entry.size();
                evicted_count += 1;
            }
        }

        self.memory_usage.fetch_sub(freed_memory, Ordering::Relaxed);
        self.evictions.fetch_add(evicted_count, Ordering::Relaxed);
        info!("Evicted {} LRU cache entries, freed {} bytes", evicted_count, freed_memory);
    }
}

impl Drop for InMemoryCache {
    fn drop(&mut self) {
        self.cleanup_task.abort();
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_expired() {
                drop(entry);
                if let Some((_, expired_entry)) = self.entries.remove_if(key, |_, e| e.is_expired()) {
                    self.memory_usage.fetch_sub(expired_entry.size(), Ordering::Relaxed);
                    self.expired_cleanups.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }

            entry.mark_accessed();
            let value = entry.value.clone();

            self.hits.fetch_add(1, Ordering::Relaxed);
            Ok(Some(value))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.evict_if_needed(key);

        let entry = CacheEntry::new(value.to_vec(), ttl);
        let entry_size = entry.size();

        if let Some(old_entry) = self.entries.insert(key.to_string(), entry) {
            self.memory_usage.fetch_sub(old_entry.size(), Ordering::Relaxed);
        }
        self.memory_usage.fetch_add(entry_size, Ordering::Relaxed);

        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        if let Some((_, entry)) = self.entries.remove(key) {
            self.memory_usage.fetch_sub(entry.size(), Ordering::Relaxed);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn stats(&self) -> CacheResult<CacheStoreStats> {
        Ok(CacheStoreStats {
            entries: self.entries.len(),
            memory_usage: self.memory_usage.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_cleanups: self.expired_cleanups.load(Ordering::Relaxed),
        })
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(!self.cleanup_task.is_finished())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(max_entries: usize) -> InMemoryCache {
        InMemoryCache::new(InMemoryCacheConfig {
            max_entries,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let cache = cache_with(100);

        let key = "catalog:search:alien:1";
        let value = br#"{"results":[]}"#;

        cache.set(key, value, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get(key).await.unwrap(), Some(value.to_vec()));

        assert!(cache.delete(key).await.unwrap());
        assert_eq!(cache.get(key).await.unwrap(), None);
        assert!(!cache.delete(key).await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_last_writer_wins() {
        let cache = cache_with(100);

        cache.set("k", b"first", Duration::from_secs(60)).await.unwrap();
        cache.set("k", b"second", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(cache.stats().await.unwrap().entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiration() {
        let cache = cache_with(100);

        cache.set("expire_test", b"value", Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("expire_test").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("expire_test").await.unwrap(), None);
        assert_eq!(cache.stats().await.unwrap().entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction() {
        let cache = cache_with(3);

        for i in 0..3 {
            let key = format!("key_{}", i);
            cache.set(&key, b"v", Duration::from_secs(60)).await.unwrap();
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        // Touch key_0 so key_1 becomes the least recently used
        cache.get("key_0").await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;

        cache.set("key_3", b"v", Duration::from_secs(60)).await.unwrap();

        assert!(cache.get("key_1").await.unwrap().is_none());
        assert!(cache.get("key_0").await.unwrap().is_some());
        assert!(cache.get("key_2").await.unwrap().is_some());
        assert!(cache.get("key_3").await.unwrap().is_some());
        assert_eq!(cache.stats().await.unwrap().evictions, 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let cache = cache_with(100);

        cache.set("key1", b"value1", Duration::from_secs(60)).await.unwrap();
        cache.get("key1").await.unwrap();
        cache.get("key2").await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!(stats.memory_usage > 0);
    }

    #[tokio::test]
    async fn test_health_check() {
        let cache = cache_with(10);
        assert!(cache.health_check().await.unwrap());
        assert_eq!(cache.backend(), "memory");
    }
}
