//! # Configuration Module
//!
//! Configuration structures and loading for the catalog gateway.
//!
//! ## Key Features
//! - YAML configuration parsing with serde (every section has defaults)
//! - Environment variable overrides applied after the file
//! - Validation that reports every problem at once

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::core::error::{GatewayError, GatewayResult};
use crate::upstream::RetryPolicy;

/// Main gateway configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener and CORS settings
    pub server: ServerConfig,

    /// Catalog API connection settings
    pub upstream: UpstreamConfig,

    /// Cache backend and TTL policy
    pub cache: CacheConfig,

    /// Per-client request limits
    pub rate_limit: RateLimitConfig,

    /// Logging settings
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Load configuration from a YAML file, then apply environment overrides and validate
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path).await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    /// Environment overrides and validation apply either way.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        if tokio::fs::try_exists(path.as_ref()).await.unwrap_or(false) {
            return Self::load_from_file(path).await;
        }

        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text without overrides or validation
    pub fn from_yaml(content: &str) -> GatewayResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// `API_PORT`, `APP_ORIGIN`, `REDIS_URL` and `TMDB_V4_TOKEN` keep the names the
    /// deployment already uses; the rest follow `GATEWAY_<SECTION>_<FIELD>`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("API_PORT") {
            self.server.port = port.parse()
                .map_err(|e| GatewayError::config(format!("Invalid API_PORT: {}", e)))?;
        }

        if let Some(addr) = lookup("GATEWAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Some(origins) = lookup("APP_ORIGIN") {
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(token) = lookup("TMDB_V4_TOKEN") {
            self.upstream.api_token = token;
        }

        if let Some(base_url) = lookup("CATALOG_UPSTREAM_BASE_URL") {
            self.upstream.base_url = base_url;
        }

        if let Some(timeout) = lookup("GATEWAY_UPSTREAM_ATTEMPT_TIMEOUT") {
            self.upstream.attempt_timeout = humantime::parse_duration(&timeout)
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_UPSTREAM_ATTEMPT_TIMEOUT: {}", e)))?;
        }

        if let Some(url) = lookup("REDIS_URL") {
            self.cache.redis.url = url;
            self.cache.backend = CacheBackend::Redis;
        }

        if let Some(mode) = lookup("GATEWAY_CACHE_FAILURE_MODE") {
            self.cache.failure_mode = match mode.to_lowercase().as_str() {
                "bypass" => CacheFailureMode::Bypass,
                "fail" => CacheFailureMode::Fail,
                other => {
                    return Err(GatewayError::config(format!(
                        "Invalid GATEWAY_CACHE_FAILURE_MODE: {}",
                        other
                    )))
                }
            };
        }

        if let Some(coalesce) = lookup("GATEWAY_CACHE_COALESCE") {
            self.cache.coalesce_misses = coalesce.parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_CACHE_COALESCE: {}", e)))?;
        }

        if let Some(enabled) = lookup("GATEWAY_RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = enabled.parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_RATE_LIMIT_ENABLED: {}", e)))?;
        }

        if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
            self.observability.logging.level = level;
        }

        if let Some(format) = lookup("GATEWAY_LOG_FORMAT") {
            self.observability.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(GatewayError::config(format!("Invalid GATEWAY_LOG_FORMAT: {}", other)))
                }
            };
        }

        Ok(())
    }

    /// Configuration validation with detailed error messages
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        for origin in &self.server.allowed_origins {
            if axum::http::HeaderValue::from_str(origin).is_err() {
                errors.push(format!("allowed origin '{}' is not a valid header value", origin));
            }
        }

        if self.upstream.api_token.trim().is_empty() {
            errors.push("upstream api_token cannot be empty (set TMDB_V4_TOKEN)".to_string());
        }

        match Url::parse(&self.upstream.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(format!("upstream base_url has unsupported scheme '{}'", url.scheme())),
            Err(e) => errors.push(format!("upstream base_url is invalid: {}", e)),
        }

        if self.upstream.attempt_timeout.is_zero() {
            errors.push("upstream attempt_timeout must be greater than 0".to_string());
        }

        if self.upstream.retry.max_attempts == 0 {
            errors.push("upstream retry max_attempts must be at least 1".to_string());
        }

        if self.upstream.retry.backoff_multiplier < 1.0 {
            errors.push(format!(
                "upstream retry backoff_multiplier must be >= 1.0, got: {}",
                self.upstream.retry.backoff_multiplier
            ));
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.redis.url.is_empty() {
            errors.push("redis url cannot be empty when the redis backend is selected".to_string());
        }

        if self.cache.in_memory.max_entries == 0 {
            errors.push("in_memory max_entries must be greater than 0".to_string());
        }

        if self.cache.in_memory.cleanup_interval.is_zero() {
            errors.push("in_memory cleanup_interval must be greater than 0".to_string());
        }

        for (name, ttl) in [
            ("discover", self.cache.ttl.discover),
            ("media", self.cache.ttl.media),
            ("search", self.cache.ttl.search),
        ] {
            if ttl.as_secs() == 0 {
                errors.push(format!("cache ttl for '{}' must be at least 1s", name));
            }
        }

        if self.rate_limit.enabled && self.rate_limit.requests_per_window == 0 {
            errors.push("rate_limit requests_per_window must be greater than 0".to_string());
        }

        // The expiry sweeper ticks on this period even when limiting is disabled
        if self.rate_limit.window.is_zero() {
            errors.push("rate_limit window must be greater than 0".to_string());
        }

        match self.observability.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!("Invalid log level: {}", self.observability.logging.level)),
        }

        if !errors.is_empty() {
            return Err(GatewayError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,

    /// HTTP port
    pub port: u16,

    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,

    /// How long in-flight requests get after a shutdown signal
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Catalog API configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL every resource path is appended to
    pub base_url: String,

    /// Bearer token sent with every call
    #[serde(skip_serializing)]
    pub api_token: String,

    /// Deadline for a single attempt
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,

    /// Retry and backoff policy
    pub retry: RetryPolicy,
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"<redacted>")
            .field("attempt_timeout", &self.attempt_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_token: String::new(),
            attempt_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Cache backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

/// What to do when the cache store itself fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheFailureMode {
    /// Treat failed reads as misses and failed writes as no-ops
    Bypass,
    /// Surface the failure to the caller
    Fail,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis: RedisCacheConfig,
    pub in_memory: InMemoryCacheConfig,
    pub failure_mode: CacheFailureMode,

    /// Share one producer invocation between concurrent misses for the same key
    pub coalesce_misses: bool,

    /// Keys longer than this are replaced by a hash
    pub max_key_length: usize,

    pub ttl: CacheTtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis: RedisCacheConfig::default(),
            in_memory: InMemoryCacheConfig::default(),
            failure_mode: CacheFailureMode::Bypass,
            coalesce_misses: false,
            max_key_length: 512,
            ttl: CacheTtlConfig::default(),
        }
    }
}

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisCacheConfig {
    /// Redis connection URL
    pub url: String,

    /// Prefix prepended to every key
    pub key_prefix: String,

    /// Connection timeout at startup
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: String::new(),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

/// In-memory store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,

    /// Cleanup interval for expired entries
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// TTL per logical query pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlConfig {
    #[serde(with = "humantime_serde")]
    pub discover: Duration,
    #[serde(with = "humantime_serde")]
    pub media: Duration,
    #[serde(with = "humantime_serde")]
    pub search: Duration,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            discover: Duration::from_secs(60),
            media: Duration::from_secs(300),
            search: Duration::from_secs(60),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_window: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 120,
            window: Duration::from_secs(60),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for this crate when `RUST_LOG` is unset
    pub level: String,

    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.upstream.api_token = "token".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.upstream.attempt_timeout, Duration::from_secs(10));
        assert_eq!(config.upstream.retry.max_attempts, 3);
        assert_eq!(config.upstream.retry.base_delay, Duration::from_millis(500));
        assert_eq!(config.cache.ttl.discover, Duration::from_secs(60));
        assert_eq!(config.cache.ttl.media, Duration::from_secs(300));
        assert_eq!(config.cache.ttl.search, Duration::from_secs(60));
        assert_eq!(config.cache.failure_mode, CacheFailureMode::Bypass);
        assert_eq!(config.rate_limit.requests_per_window, 120);
    }

    #[test]
    fn test_debug_output_hides_api_token() {
        let mut config = GatewayConfig::default();
        config.upstream.api_token = "tok-3f9a-secret".to_string();

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("tok-3f9a-secret"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("api.themoviedb.org"));
    }

    #[test]
    fn test_missing_token_fails_validation() {
        let err = GatewayConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("api_token"));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing_with_partial_sections() {
        let yaml = r#"
server:
  port: 9000
upstream:
  api_token: abc
  attempt_timeout: 2s
  retry:
    max_attempts: 5
    base_delay: 100ms
cache:
  backend: redis
  failure_mode: fail
  ttl:
    media: 10m
"#;
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.upstream.attempt_timeout, Duration::from_secs(2));
        assert_eq!(config.upstream.retry.max_attempts, 5);
        assert_eq!(config.upstream.retry.base_delay, Duration::from_millis(100));
        assert_eq!(config.upstream.retry.backoff_multiplier, 2.0);
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.cache.failure_mode, CacheFailureMode::Fail);
        assert_eq!(config.cache.ttl.media, Duration::from_secs(600));
        assert_eq!(config.cache.ttl.search, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("API_PORT", "8181"),
            ("APP_ORIGIN", "https://a.example, https://b.example"),
            ("TMDB_V4_TOKEN", "secret"),
            ("REDIS_URL", "redis://cache:6379"),
            ("GATEWAY_CACHE_FAILURE_MODE", "fail"),
            ("GATEWAY_LOG_FORMAT", "text"),
        ]
        .into_iter()
        .collect();

        let mut config = GatewayConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 8181);
        assert_eq!(
            config.server.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.upstream.api_token, "secret");
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.cache.redis.url, "redis://cache:6379");
        assert_eq!(config.cache.failure_mode, CacheFailureMode::Fail);
        assert_eq!(config.observability.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = GatewayConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "API_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = valid_config();
        config.upstream.base_url = "not a url".to_string();
        config.upstream.retry.max_attempts = 0;
        config.cache.ttl.search = Duration::from_millis(10);
        config.observability.logging.level = "loud".to_string();
        config.cache.in_memory.cleanup_interval = Duration::ZERO;
        config.rate_limit.enabled = false;
        config.rate_limit.window = Duration::ZERO;

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("base_url"));
        assert!(message.contains("max_attempts"));
        assert!(message.contains("'search'"));
        assert!(message.contains("Invalid log level"));
        assert!(message.contains("cleanup_interval"));
        assert!(message.contains("rate_limit window"));
    }
}
