//! # Upstream Client Integration Tests
//!
//! Runs the reqwest-backed client against a wiremock catalog:
//! - bearer auth and query parameters on the wire
//! - retry with exponential backoff until success
//! - exhaustion after the attempt budget
//! - per-attempt timeout handling
//! - optional terminal handling of client errors

use catalog_gateway::core::config::UpstreamConfig;
use catalog_gateway::upstream::{
    CatalogFetcher, QueryParams, RetryPolicy, UpstreamClient, UpstreamError, UpstreamRequest,
};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing_test::traced_test;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(10),
        ..Default::default()
    }
}

fn client_for(server: &MockServer, retry: RetryPolicy, attempt_timeout: Duration) -> UpstreamClient {
    let config = UpstreamConfig {
        base_url: server.uri(),
        api_token: "test-token".to_string(),
        attempt_timeout,
        retry,
    };
    UpstreamClient::new(&config).unwrap()
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

#[tokio::test]
async fn test_sends_bearer_token_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/discover/movie"))
        .and(header("authorization", "Bearer test-token"))
        .and(query_param("language", "en-US"))
        .and(query_param("sort_by", "popularity.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"page": 1, "results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(), Duration::from_secs(2));
    let params = QueryParams::new()
        .with("language", "en-US")
        .with("sort_by", "popularity.desc");

    let payload = client.get("discover/movie", params).await.unwrap();
    assert_eq!(payload.to_value().unwrap(), json!({"page": 1, "results": []}));
}

#[tokio::test]
async fn test_payload_is_returned_verbatim() {
    let server = MockServer::start().await;
    let body = r#"{"z":1,  "a":{"nested":[1,2,3]}}"#;
    Mock::given(method("GET"))
        .and(path("/movie/550"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(), Duration::from_secs(2));
    let payload = client.get("movie/550", QueryParams::new()).await.unwrap();
    assert_eq!(payload.as_str(), body);
}

#[tokio::test]
#[traced_test]
async fn test_retries_then_succeeds_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/multi"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/multi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": ["ok"]})))
        .mount(&server)
        .await;

    // Default policy: 500ms then 1000ms between the three attempts
    let client = client_for(&server, RetryPolicy::default(), Duration::from_secs(2));
    let started = Instant::now();

    let payload = client
        .get("search/multi", QueryParams::new().with("query", "alien"))
        .await
        .unwrap();

    assert_eq!(payload.to_value().unwrap(), json!({"results": ["ok"]}));
    assert_eq!(request_count(&server).await, 3);
    assert!(started.elapsed() >= Duration::from_millis(1500));

    // Each failed attempt is logged with its ordinal before the success
    logs_assert(|lines: &[&str]| {
        let failures: Vec<&&str> = lines
            .iter()
            .filter(|line| line.contains("Upstream attempt failed"))
            .collect();
        match failures.as_slice() {
            [first, second] if first.contains("attempt=1") && second.contains("attempt=2") => Ok(()),
            other => Err(format!("expected failures for attempts 1 and 2, got {:?}", other)),
        }
    });
    assert!(logs_contain("Upstream call succeeded"));
}

#[tokio::test]
async fn test_exhausts_after_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tv/1399"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(), Duration::from_secs(2));
    let request = UpstreamRequest::new("tv/1399", QueryParams::new()).unwrap();

    let err = client.fetch(&request).await.unwrap_err();
    match &err {
        UpstreamError::Exhausted { path, attempts, .. } => {
            assert_eq!(path, "tv/1399");
            assert_eq!(*attempts, 3);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.status(), Some(503));
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_attempt_timeout_counts_as_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let retry = RetryPolicy {
        max_attempts: 2,
        ..fast_retry()
    };
    let client = client_for(&server, retry, Duration::from_millis(50));

    let err = client.get("movie/1", QueryParams::new()).await.unwrap_err();
    match err {
        UpstreamError::Exhausted { attempts, last, .. } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, UpstreamError::Transport { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_client_errors_can_be_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/999999"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let retry = RetryPolicy {
        retry_client_errors: false,
        ..fast_retry()
    };
    let client = client_for(&server, retry, Duration::from_secs(2));

    let err = client.get("movie/999999", QueryParams::new()).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_client_errors_are_retried_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/999999"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server, fast_retry(), Duration::from_secs(2));

    let err = client.get("movie/999999", QueryParams::new()).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_non_json_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let retry = RetryPolicy {
        max_attempts: 1,
        ..fast_retry()
    };
    let client = client_for(&server, retry, Duration::from_secs(2));

    let err = client.get("movie/2", QueryParams::new()).await.unwrap_err();
    match err {
        UpstreamError::Exhausted { last, .. } => assert!(matches!(*last, UpstreamError::Transport { .. })),
        other => panic!("unexpected error: {:?}", other),
    }
}
