//! # Rate Limiting
//!
//! Fixed-window limiter keyed by client address. Each client gets
//! `requests_per_window` requests per `window`; the counter resets when the window
//! that started with the client's first request has elapsed.
//!
//! ## Usage Example
//! ```rust,ignore
//! let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
//! let app = Router::new()
//!     .route("/v1/search", get(search))
//!     .layer(axum::middleware::from_fn_with_state(limiter, rate_limit_middleware));
//! ```

use crate::core::config::RateLimitConfig;
use crate::core::error::GatewayError;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Outcome of one rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Time until the current window resets
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Snapshot of rate limiting metrics
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub requests_allowed: u64,
    pub requests_denied: u64,
    pub tracked_clients: usize,
}

/// In-memory fixed-window rate limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Window>,
    requests_allowed: AtomicU64,
    requests_denied: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            requests_allowed: AtomicU64::new(0),
            requests_denied: AtomicU64::new(0),
        }
    }

    /// Count one request from `client` and decide whether it may proceed
    pub fn check(&self, client: &str) -> RateLimitDecision {
        let now = Instant::now();
        let limit = self.config.requests_per_window;
        let window_length = self.config.window;

        let mut window = self
            .windows
            .entry(client.to_string())
            .or_insert(Window { started: now, count: 0 });

        if now.duration_since(window.started) >= window_length {
            *window = Window { started: now, count: 0 };
        }

        let retry_after = window_length.saturating_sub(now.duration_since(window.started));
        let allowed = window.count < limit;
        if allowed {
            window.count += 1;
        }
        let remaining = limit.saturating_sub(window.count);
        drop(window);

        if allowed {
            self.requests_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_denied.fetch_add(1, Ordering::Relaxed);
        }

        RateLimitDecision {
            allowed,
            remaining,
            retry_after,
        }
    }

    /// Drop windows that have already ended
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let window_length = self.config.window;
        self.windows
            .retain(|_, window| now.duration_since(window.started) < window_length);
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn metrics(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            requests_allowed: self.requests_allowed.load(Ordering::Relaxed),
            requests_denied: self.requests_denied.load(Ordering::Relaxed),
            tracked_clients: self.windows.len(),
        }
    }
}

/// axum middleware applying [`RateLimiter`] per client IP.
///
/// The client address comes from `ConnectInfo`; requests served without it (for
/// example in-process tests) share the `unknown` bucket.
pub async fn rate_limit_middleware(State(limiter): State<Arc<RateLimiter>>, request: Request, next: Next) -> Response {
    if !limiter.config().enabled {
        return next.run(request).await;
    }

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let decision = limiter.check(&client);
    if !decision.allowed {
        warn!(
            client = %client,
            path = %request.uri().path(),
            retry_after_secs = decision.retry_after.as_secs(),
            "Rate limit exceeded"
        );

        let error = GatewayError::RateLimitExceeded {
            limit: limiter.config().requests_per_window,
            window: humantime::format_duration(limiter.config().window).to_string(),
        };
        let mut response = error.into_response();
        let retry_after = decision.retry_after.as_secs().max(1);
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
        return response;
    }

    debug!(client = %client, remaining = decision.remaining, "Rate limit check passed");

    let mut response = next.run(request).await;
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
            response.headers_mut().insert("x-ratelimit-remaining", value);
        }
    }
    response
}
