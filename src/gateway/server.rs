//! # HTTP Server Module
//!
//! Wires the gateway together and serves it with axum:
//! - builds the cache store selected by configuration (in-memory or Redis)
//! - builds the upstream client and the catalog service on top of it
//! - mounts the routes with CORS, request tracing and rate limiting
//! - serves until SIGINT/SIGTERM, then drains in-flight requests
//!
//! Every long-lived resource (store connection, HTTP client) is created once here
//! and shared through [`AppState`] for the life of the process.

use super::handlers;
use crate::caching::{CacheStore, CacheWrap, CacheWrapConfig, InMemoryCache, RedisCache};
use crate::catalog::CatalogService;
use crate::core::config::{CacheBackend, CacheConfig, GatewayConfig};
use crate::core::error::{GatewayError, GatewayResult};
use crate::middleware::{cors_layer, rate_limit_middleware, RateLimiter};
use crate::upstream::{CatalogFetcher, UpstreamClient};
use axum::routing::get;
use axum::Router;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
}

/// Create the cache store selected by `config.backend`
pub async fn build_cache_store(config: &CacheConfig) -> GatewayResult<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Memory => {
            info!("Using in-memory cache (max {} entries)", config.in_memory.max_entries);
            Arc::new(InMemoryCache::new(config.in_memory.clone())?)
        }
        CacheBackend::Redis => {
            let store = RedisCache::new(config.redis.clone())
                .await
                .map_err(|e| GatewayError::cache_unavailable(format!("Failed to connect to Redis: {}", e)))?;
            Arc::new(store)
        }
    };
    Ok(store)
}

/// Build the application router
pub fn build_router(state: AppState, rate_limiter: Arc<RateLimiter>, config: &GatewayConfig) -> Router {
    let api = Router::new()
        .route("/v1/discover", get(handlers::discover))
        .route("/v1/media/:type/:id", get(handlers::media))
        .route("/v1/search", get(handlers::search))
        .route_layer(axum::middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    Router::new()
        .merge(api)
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.server)),
        )
}

/// The catalog gateway HTTP server
pub struct GatewayServer {
    config: GatewayConfig,
    state: AppState,
    rate_limiter: Arc<RateLimiter>,
}

impl GatewayServer {
    /// Build every component from configuration
    pub async fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let store = build_cache_store(&config.cache).await?;
        let client = UpstreamClient::new(&config.upstream)?;
        info!("Upstream catalog at {}", client.base_url());

        Ok(Self::with_components(config, Arc::new(client), store))
    }

    /// Assemble a server from an existing fetcher and store
    pub fn with_components(
        config: GatewayConfig,
        fetcher: Arc<dyn CatalogFetcher>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        let cache = Arc::new(CacheWrap::new(store, CacheWrapConfig::from(&config.cache)));
        let catalog = CatalogService::new(fetcher, cache, config.cache.ttl.clone(), config.cache.max_key_length);
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        Self {
            config,
            state: AppState {
                catalog: Arc::new(catalog),
            },
            rate_limiter,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.rate_limiter.clone(), &self.config)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn bind_addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.config.server.bind_address, self.config.server.port)
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid bind address: {}", e)))
    }

    /// Periodically drop finished rate limit windows
    fn spawn_rate_limit_sweeper(&self) -> JoinHandle<()> {
        let limiter = self.rate_limiter.clone();
        let period = self.config.rate_limit.window;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                limiter.purge_expired();
            }
        })
    }

    /// Serve until a shutdown signal arrives
    pub async fn start(self) -> GatewayResult<()> {
        let bind_addr = self.bind_addr()?;
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| GatewayError::internal(format!("Failed to bind gateway server to {}: {}", bind_addr, e)))?;

        info!("🌐 Catalog gateway listening on {}", bind_addr);

        let sweeper = self.spawn_rate_limit_sweeper();
        let app = self.router();
        let shutdown_timeout = self.config.server.shutdown_timeout;

        let signalled = Arc::new(Notify::new());
        let graceful = {
            let signalled = signalled.clone();
            async move {
                shutdown_signal().await;
                signalled.notify_one();
            }
        };

        let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(graceful)
            .into_future();
        tokio::pin!(server);

        let result = tokio::select! {
            result = &mut server => Some(result),
            _ = signalled.notified() => None,
        };

        let result = match result {
            Some(result) => result.map_err(|e| GatewayError::internal(format!("Gateway server error: {}", e))),
            None => {
                info!("⏳ Waiting for in-flight requests to complete...");
                match tokio::time::timeout(shutdown_timeout, &mut server).await {
                    Ok(result) => result.map_err(|e| GatewayError::internal(format!("Gateway server error: {}", e))),
                    Err(_) => {
                        warn!("⚠️  Server shutdown timed out after {:?}, forcing shutdown", shutdown_timeout);
                        Ok(())
                    }
                }
            }
        };

        sweeper.abort();
        result
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("📡 Received SIGINT (Ctrl+C), initiating graceful shutdown..."),
        _ = terminate => info!("📡 Received SIGTERM, initiating graceful shutdown..."),
    }
}
