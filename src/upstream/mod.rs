//! # Upstream Catalog Client
//!
//! Everything needed to talk to the third-party catalog API: request construction,
//! the retry policy with its explicit state machine, and the reqwest-backed client.
//!
//! The client is stateless across calls and safe to share behind an `Arc` between
//! any number of concurrent requests. Retries are invisible to callers apart from
//! the added latency; once the attempt budget is spent the caller receives
//! `UpstreamError::Exhausted` carrying the last observed failure.

pub mod client;
pub mod request;
pub mod retry;

pub use client::{CatalogFetcher, UpstreamClient};
pub use request::{QueryParams, UpstreamRequest};
pub use retry::{RetryEvent, RetryPolicy, RetryState};

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;

/// Upstream operation result
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Upstream-specific error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// Network failure, timeout or unreadable body during one attempt
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Upstream answered with a non-2xx status
    #[error("upstream responded with status {status}")]
    Status { status: u16 },

    /// The attempt budget is spent
    #[error("upstream '{path}' failed after {attempts} attempt(s): {last}")]
    Exhausted {
        path: String,
        attempts: u32,
        last: Box<UpstreamError>,
    },

    /// The request could not be built (empty path, unparseable URL)
    #[error("invalid upstream request: {message}")]
    InvalidRequest { message: String },
}

impl UpstreamError {
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Last HTTP status observed, if the failure came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            Self::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// A decoded upstream JSON body, kept as the exact text that was received.
///
/// Nothing in the gateway inspects catalog fields, so the payload is validated as
/// JSON once and then passed through (and cached) without re-encoding.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogPayload(Box<RawValue>);

impl CatalogPayload {
    /// Validate `bytes` as a single JSON document
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice::<Box<RawValue>>(bytes).map(Self)
    }

    /// Build a payload from an already parsed value
    pub fn from_value(value: &serde_json::Value) -> serde_json::Result<Self> {
        serde_json::value::to_raw_value(value).map(Self)
    }

    /// The raw JSON text
    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    /// Parse into a generic JSON value
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(self.0.get())
    }
}

impl PartialEq for CatalogPayload {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Debug for CatalogPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CatalogPayload").field(&self.as_str()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_preserves_text() {
        let body = br#"{"b":1,"a":[true,null],"title":"Fight Club"}"#;
        let payload = CatalogPayload::from_slice(body).unwrap();
        assert_eq!(payload.as_str().as_bytes(), body);

        let cached = serde_json::to_vec(&payload).unwrap();
        let restored: CatalogPayload = serde_json::from_slice(&cached).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn test_payload_rejects_invalid_json() {
        assert!(CatalogPayload::from_slice(b"<html>").is_err());
    }

    #[test]
    fn test_exhausted_reports_last_status() {
        let err = UpstreamError::Exhausted {
            path: "search/multi".to_string(),
            attempts: 3,
            last: Box::new(UpstreamError::Status { status: 503 }),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(UpstreamError::transport("reset").status(), None);
    }
}
