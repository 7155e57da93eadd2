//! # Upstream HTTP Client
//!
//! Resilient single-call primitive against the catalog API. Each attempt:
//! 1. builds the absolute URL (base URL + path + encoded query)
//! 2. sends a GET with the bearer token
//! 3. is bounded by `attempt_timeout`; hitting the deadline counts as a transport failure
//!
//! Any transport failure or non-2xx status is logged with its attempt ordinal and fed
//! into the [`RetryPolicy`] state machine, which decides between backoff and giving up.

use super::{CatalogPayload, RetryEvent, RetryPolicy, RetryState, UpstreamError, UpstreamRequest, UpstreamResult};
use crate::core::config::UpstreamConfig;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use url::Url;

/// Anything that can resolve an [`UpstreamRequest`] into a catalog payload.
///
/// The aggregation layer and the catalog service depend on this trait rather than
/// on the concrete client, so they can be exercised without a network.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    async fn fetch(&self, request: &UpstreamRequest) -> UpstreamResult<CatalogPayload>;
}

/// reqwest-backed catalog client with timeout, retry and exponential backoff
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: Url,
    api_token: String,
    attempt_timeout: Duration,
    retry: RetryPolicy,
}

impl fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &"<redacted>")
            .field("attempt_timeout", &self.attempt_timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl UpstreamClient {
    /// Create a client from configuration
    pub fn new(config: &UpstreamConfig) -> UpstreamResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| UpstreamError::InvalidRequest {
            message: format!("invalid upstream base URL '{}': {}", config.base_url, e),
        })?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.attempt_timeout)
            .build()
            .map_err(|e| UpstreamError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            api_token: config.api_token.clone(),
            attempt_timeout: config.attempt_timeout,
            retry: config.retry.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Convenience wrapper around [`CatalogFetcher::fetch`]
    pub async fn get(&self, path: &str, params: super::QueryParams) -> UpstreamResult<CatalogPayload> {
        let request = UpstreamRequest::new(path, params)?;
        self.fetch(&request).await
    }

    /// One bounded HTTP round-trip
    async fn attempt(&self, url: &Url) -> UpstreamResult<CatalogPayload> {
        let call = async {
            let response = self
                .http
                .get(url.clone())
                .bearer_auth(&self.api_token)
                .header(ACCEPT, "application/json")
                .header(USER_AGENT, concat!("catalog-gateway/", env!("CARGO_PKG_VERSION")))
                .send()
                .await
                .map_err(|e| UpstreamError::transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(UpstreamError::Status {
                    status: status.as_u16(),
                });
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| UpstreamError::transport(format!("failed to read body: {}", e)))?;

            CatalogPayload::from_slice(&body)
                .map_err(|e| UpstreamError::transport(format!("invalid JSON body: {}", e)))
        };

        match tokio::time::timeout(self.attempt_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::transport(format!(
                "timed out after {}ms",
                self.attempt_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl CatalogFetcher for UpstreamClient {
    async fn fetch(&self, request: &UpstreamRequest) -> UpstreamResult<CatalogPayload> {
        let url = request.url(&self.base_url)?;
        let path = request.path();
        let started = Instant::now();

        let mut state = self.retry.start();
        let mut last_failure = None;

        loop {
            match state {
                RetryState::Attempting(attempt) => match self.attempt(&url).await {
                    Ok(payload) => {
                        state = self.retry.next(state, RetryEvent::Succeeded);
                        debug!(
                            path = path,
                            attempt = attempt,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Upstream call succeeded"
                        );
                        if state == RetryState::Succeeded {
                            return Ok(payload);
                        }
                    }
                    Err(failure) => {
                        let retryable = self.retry.is_retryable(&failure);
                        warn!(
                            path = path,
                            attempt = attempt,
                            max_attempts = self.retry.max_attempts,
                            retryable = retryable,
                            reason = %failure,
                            "Upstream attempt failed"
                        );
                        state = self.retry.next(state, RetryEvent::Failed { retryable });
                        last_failure = Some(failure);
                    }
                },
                RetryState::Backoff { attempt, delay } => {
                    debug!(path = path, attempt = attempt, delay_ms = delay.as_millis() as u64, "Backing off");
                    tokio::time::sleep(delay).await;
                    state = self.retry.next(state, RetryEvent::BackoffElapsed);
                }
                RetryState::Exhausted { attempts } => {
                    let last = last_failure
                        .take()
                        .unwrap_or_else(|| UpstreamError::transport("no attempt was made"));
                    error!(path = path, attempts = attempts, reason = %last, "Upstream retries exhausted");
                    return Err(UpstreamError::Exhausted {
                        path: path.to_string(),
                        attempts,
                        last: Box::new(last),
                    });
                }
                RetryState::Succeeded => {
                    return Err(UpstreamError::transport("retry state machine finished without a payload"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_hides_api_token() {
        let config = UpstreamConfig {
            base_url: "https://catalog.test/3".to_string(),
            api_token: "tok-3f9a-secret".to_string(),
            ..UpstreamConfig::default()
        };
        let client = UpstreamClient::new(&config).unwrap();

        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("tok-3f9a-secret"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("https://catalog.test/3"));
    }

    #[test]
    fn test_rejects_unparseable_base_url() {
        let config = UpstreamConfig {
            base_url: "not a url".to_string(),
            ..UpstreamConfig::default()
        };
        assert!(matches!(
            UpstreamClient::new(&config),
            Err(UpstreamError::InvalidRequest { .. })
        ));
    }
}
