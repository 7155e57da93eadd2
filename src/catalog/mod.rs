//! # Catalog Module
//!
//! The three catalog operations exposed over HTTP. Each one derives a cache key,
//! picks its TTL and hands an upstream producer to the [`CacheWrap`](crate::caching::CacheWrap):
//!
//! | Operation | Upstream                                   | Key                               | TTL  |
//! |-----------|--------------------------------------------|-----------------------------------|------|
//! | discover  | `discover/{type}`                          | `catalog:discover:{type}:{query}` | 60s  |
//! | media     | `{type}/{id}` + credits/videos/recommendations | `catalog:media:{type}:{id}`   | 300s |
//! | search    | `search/multi`                             | `catalog:search:{q}:{page}`       | 60s  |

pub mod media;
pub mod service;

pub use media::{bundle, Bundle, MediaType};
pub use service::CatalogService;
