//! # Caching System Module
//!
//! Pass-through memoization of upstream catalog responses.
//!
//! ## Architecture
//! 1. **Cache Stores**: the `CacheStore` trait with in-memory and Redis implementations.
//!    Stores own entry storage and expiry; a written value is immutable until it is
//!    overwritten or expires.
//! 2. **Key Generation**: deterministic, namespace-prefixed keys with canonical query
//!    serialization so equivalent parameter orderings share one entry.
//! 3. **Cache Wrap**: `wrap(key, ttl, producer)`, returning the stored value on a hit and
//!    invoking the producer (then writing its result) on a miss.
//! 4. **Deduplication**: optional in-flight registry so concurrent misses for one key
//!    share a single producer invocation.
//!
//! ## Usage Example
//! ```rust,ignore
//! let store: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default())?);
//! let cache = CacheWrap::new(store, CacheWrapConfig::default());
//!
//! let key = CacheKey::search("blade runner", 1);
//! let payload = cache
//!     .wrap(key.as_str(), Duration::from_secs(60), || async { fetch_from_upstream().await })
//!     .await?;
//! ```

pub mod cache_wrap;
pub mod deduplication;
pub mod key_generator;
pub mod stores;

pub use cache_wrap::{CacheWrap, CacheWrapConfig, CacheWrapStats};
pub use deduplication::InFlightRegistry;
pub use key_generator::{canonical_query, CacheKey, CACHE_NAMESPACE};
pub use stores::{CacheEntry, CacheStore, CacheStoreStats, InMemoryCache, RedisCache};

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache operation timeout")]
    Timeout,

    #[error("Cache not available")]
    Unavailable,
}
