//! # Catalog Gateway Library
//!
//! Caching, retrying front end for a third-party movie/TV catalog API. Browser
//! requests for discovery, title details and search are answered from a cache when
//! possible and otherwise forwarded to the upstream catalog.
//!
//! ## Request Flow
//!
//! ```text
//! handler ──> CatalogService ──> CacheWrap ──hit──> stored JSON
//!                                   │
//!                                  miss
//!                                   ▼
//!                    bundle() / UpstreamClient (timeout + retry) ──> CacheStore write
//! ```
//!
//! ### Ownership
//! The cache store connection and the HTTP client are created once at startup and
//! shared behind `Arc` by every request. The upstream client keeps no per-call state,
//! so any number of requests may use it concurrently.
//!
//! ### Error Handling
//! Each layer has its own `thiserror` enum (`UpstreamError`, `CacheError`) that
//! converts into [`GatewayError`]. Handlers return `GatewayResult<T>`; the error type
//! implements axum's `IntoResponse`, so `?` is all a handler needs.

/// Core functionality: error types and configuration
pub mod core;

/// Upstream catalog client: request building, retry state machine, HTTP client
pub mod upstream;

/// Caching system: stores, key derivation, cache wrap and miss coalescing
pub mod caching;

/// Catalog operations and the media bundle aggregation
pub mod catalog;

/// HTTP server, routes and handlers
pub mod gateway;

/// CORS and rate limiting
pub mod middleware;

/// Structured logging
pub mod observability;

/// Main error type used throughout the gateway
pub use crate::core::error::{GatewayError, GatewayResult};

/// Main configuration structure for the gateway
pub use crate::core::config::GatewayConfig;

pub use caching::{CacheKey, CacheStore, CacheWrap};
pub use catalog::{Bundle, CatalogService, MediaType};
pub use gateway::server::{AppState, GatewayServer};
pub use upstream::{CatalogFetcher, CatalogPayload, QueryParams, UpstreamClient, UpstreamRequest};
