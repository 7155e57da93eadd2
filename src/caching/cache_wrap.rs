//! # Cache Wrap
//!
//! `wrap(key, ttl, producer)`: return the stored value on a hit, otherwise run the
//! producer, store its result under `key` for `ttl` and return it.
//!
//! A producer failure is propagated and nothing is written, so errors never poison
//! the cache. Store failures are handled according to [`CacheFailureMode`].

use super::{CacheError, CacheStore, InFlightRegistry};
use crate::core::config::{CacheConfig, CacheFailureMode};
use crate::core::error::{GatewayError, GatewayResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Behaviour knobs for [`CacheWrap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheWrapConfig {
    pub failure_mode: CacheFailureMode,
    pub coalesce_misses: bool,
}

impl Default for CacheWrapConfig {
    fn default() -> Self {
        Self {
            failure_mode: CacheFailureMode::Bypass,
            coalesce_misses: false,
        }
    }
}

impl From<&CacheConfig> for CacheWrapConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            failure_mode: config.failure_mode,
            coalesce_misses: config.coalesce_misses,
        }
    }
}

/// Counters kept by the wrapper itself (independent of store statistics)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheWrapStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub store_failures: u64,
    pub coalesced: u64,
}

/// Store access shared between [`CacheWrap`] and the producer tasks it spawns
#[derive(Clone)]
struct StoreHandle {
    store: Arc<dyn CacheStore>,
    failure_mode: CacheFailureMode,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    store_failures: AtomicU64,
    coalesced: AtomicU64,
}

impl StoreHandle {
    /// Read and decode `key`. Undecodable entries are reported as misses.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> GatewayResult<Option<T>> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = key, "Cache hit");
                    Ok(Some(value))
                }
                Err(e) => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    warn!(key = key, error = %e, "Discarding undecodable cache entry");
                    Ok(None)
                }
            },
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache miss");
                Ok(None)
            }
            Err(e) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.on_store_failure("read", key, e).map(|_| None)
            }
        }
    }

    async fn store_value(&self, key: &str, bytes: &[u8], ttl: Duration) -> GatewayResult<()> {
        match self.store.set(key, bytes, ttl).await {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, ttl_secs = ttl.as_secs(), "Cache write");
                Ok(())
            }
            Err(e) => self.on_store_failure("write", key, e),
        }
    }

    fn on_store_failure(&self, operation: &str, key: &str, failure: CacheError) -> GatewayResult<()> {
        self.counters.store_failures.fetch_add(1, Ordering::Relaxed);

        match self.failure_mode {
            CacheFailureMode::Bypass => {
                warn!(
                    key = key,
                    operation = operation,
                    backend = self.store.backend(),
                    error = %failure,
                    "Cache store failed, bypassing"
                );
                Ok(())
            }
            CacheFailureMode::Fail => {
                error!(
                    key = key,
                    operation = operation,
                    backend = self.store.backend(),
                    error = %failure,
                    "Cache store failed"
                );
                Err(GatewayError::from(failure))
            }
        }
    }
}

/// Pass-through memoization over a [`CacheStore`].
///
/// On a miss the producer and the cache write run on a separate task. If the caller
/// is dropped mid-flight (the client disconnected), the upstream work still completes
/// and a successful result is still written.
pub struct CacheWrap {
    handle: StoreHandle,
    config: CacheWrapConfig,
    in_flight: InFlightRegistry,
}

impl CacheWrap {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheWrapConfig) -> Self {
        Self {
            handle: StoreHandle {
                store,
                failure_mode: config.failure_mode,
                counters: Arc::new(Counters::default()),
            },
            config,
            in_flight: InFlightRegistry::new(),
        }
    }

    /// Return the cached value for `key`, or produce, store and return it
    pub async fn wrap<T, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> GatewayResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = GatewayResult<T>> + Send + 'static,
    {
        if let Some(value) = self.handle.lookup::<T>(key).await? {
            return Ok(value);
        }

        let handle = self.handle.clone();
        let owned_key = key.to_string();

        if !self.config.coalesce_misses {
            let task = tokio::spawn(async move {
                let value = producer().await?;
                let bytes = serde_json::to_vec(&value)?;
                handle.store_value(&owned_key, &bytes, ttl).await?;
                Ok::<_, GatewayError>(value)
            });
            return task
                .await
                .map_err(|e| GatewayError::internal(format!("Cache producer task failed: {}", e)))?;
        }

        let outcome = self
            .in_flight
            .run(key, move || async move {
                let value = producer().await?;
                let bytes = serde_json::to_vec(&value)?;
                handle.store_value(&owned_key, &bytes, ttl).await?;
                Ok::<_, GatewayError>(bytes)
            })
            .await;

        if !outcome.led {
            self.handle.counters.coalesced.fetch_add(1, Ordering::Relaxed);
        }

        let bytes = outcome.result?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn stats(&self) -> CacheWrapStats {
        let counters = &self.handle.counters;
        CacheWrapStats {
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            writes: counters.writes.load(Ordering::Relaxed),
            store_failures: counters.store_failures.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.handle.store
    }

    pub fn config(&self) -> CacheWrapConfig {
        self.config
    }
}
