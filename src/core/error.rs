//! # Error Handling Module
//!
//! This module provides the top-level error type for the catalog gateway using the `thiserror` crate.
//! Every failure that can reach an HTTP handler is expressed as a `GatewayError`, which knows how
//! to map itself to an HTTP status code and a structured JSON body.
//!
//! ## Error Flow
//! - `UpstreamError` (upstream module) and `CacheError` (caching module) are layer-local errors
//! - Both convert into `GatewayError` with `From`, so `?` propagates them unchanged in meaning
//! - Retries happen entirely inside the upstream client; by the time an upstream failure becomes
//!   a `GatewayError` the attempt budget is already spent
//!
//! ### Why `Clone`
//! When concurrent cache misses are coalesced, one producer result is handed to every waiter,
//! so the error has to be cloneable.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::caching::CacheError;
use crate::upstream::UpstreamError;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types surfaced by the catalog gateway
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Configuration-related errors (invalid config, missing token, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Inbound request validation errors (bad media type, non-numeric id, etc.)
    #[error("Request validation failed: {field} - {reason}")]
    RequestValidation { field: String, reason: String },

    /// All upstream attempts failed; carries the last observed failure
    #[error("Upstream request to '{path}' failed after {attempts} attempt(s): {reason}")]
    UpstreamExhausted {
        path: String,
        attempts: u32,
        status: Option<u16>,
        reason: String,
    },

    /// One of the bundle sub-calls failed, so the whole bundle failed
    #[error("Aggregation of '{resource}' failed: {reason}")]
    AggregationFailed {
        resource: String,
        status: Option<u16>,
        reason: String,
    },

    /// The cache store could not be reached and the failure mode says to fail
    #[error("Cache unavailable: {message}")]
    CacheUnavailable { message: String },

    /// Rate limiting errors when request limits are exceeded
    #[error("Rate limit exceeded: {limit} requests per {window}")]
    RateLimitExceeded { limit: u32, window: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (file operations, socket binding, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error for a specific request field
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, reason: S) -> Self {
        Self::RequestValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a cache unavailable error
    pub fn cache_unavailable<S: Into<String>>(message: S) -> Self {
        Self::CacheUnavailable {
            message: message.into(),
        }
    }

    /// Wrap a failed bundle sub-call. The upstream status, if any, is kept so
    /// that a missing title still reads as 404 to the client.
    pub fn aggregation<S: Into<String>>(resource: S, cause: GatewayError) -> Self {
        let status = match &cause {
            Self::UpstreamExhausted { status, .. } => *status,
            Self::AggregationFailed { status, .. } => *status,
            _ => None,
        };
        Self::AggregationFailed {
            resource: resource.into(),
            status,
            reason: cause.to_string(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RequestValidation { .. } => StatusCode::BAD_REQUEST,
            Self::UpstreamExhausted { status: Some(404), .. } => StatusCode::NOT_FOUND,
            Self::UpstreamExhausted { .. } => StatusCode::BAD_GATEWAY,
            Self::AggregationFailed { status: Some(404), .. } => StatusCode::NOT_FOUND,
            Self::AggregationFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::CacheUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Json { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check whether a client could reasonably retry the same request later
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamExhausted { status, .. } | Self::AggregationFailed { status, .. } => {
                !matches!(status, Some(400..=499))
            }
            Self::CacheUnavailable { .. } => true,
            Self::RateLimitExceeded { .. } => true,
            _ => false,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::RequestValidation { .. } => "request_validation_error",
            Self::UpstreamExhausted { .. } => "upstream_exhausted",
            Self::AggregationFailed { .. } => "aggregation_failed",
            Self::CacheUnavailable { .. } => "cache_unavailable",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Exhausted { path, attempts, last } => Self::UpstreamExhausted {
                path,
                attempts,
                status: last.status(),
                reason: last.to_string(),
            },
            UpstreamError::InvalidRequest { message } => Self::internal(message),
            other => Self::UpstreamExhausted {
                path: String::new(),
                attempts: 1,
                status: other.status(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<CacheError> for GatewayError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Serialization(e) => Self::Json {
                message: e.to_string(),
            },
            other => Self::cache_unavailable(other.to_string()),
        }
    }
}

/// Errors become JSON responses with the mapped status code
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
                "retryable": self.is_retryable(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}
