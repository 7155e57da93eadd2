//! Media types and the four-way bundle aggregation.

use crate::core::error::{GatewayError, GatewayResult};
use crate::upstream::{CatalogFetcher, CatalogPayload, QueryParams, UpstreamRequest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Language forwarded on every bundle sub-call
pub const BUNDLE_LANGUAGE: &str = "en-US";

/// Catalog resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }
}

impl Default for MediaType {
    fn default() -> Self {
        Self::Movie
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "movie" => Ok(Self::Movie),
            "tv" => Ok(Self::Tv),
            other => Err(GatewayError::validation(
                "type",
                format!("expected 'movie' or 'tv', got '{}'", other),
            )),
        }
    }
}

/// Details, credits, videos and recommendations for one title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub details: CatalogPayload,
    pub credits: CatalogPayload,
    pub videos: CatalogPayload,
    pub recommendations: CatalogPayload,
}

/// Fetch the four parts of a bundle concurrently.
///
/// All four calls are in flight at once and the bundle is only returned once every
/// one of them succeeded. The first failure fails the whole bundle; the remaining
/// calls are dropped.
pub async fn bundle(fetcher: &dyn CatalogFetcher, media_type: MediaType, id: u64) -> GatewayResult<Bundle> {
    let base = format!("{}/{}", media_type, id);
    let details = part_request(base.clone())?;
    let credits = part_request(format!("{}/credits", base))?;
    let videos = part_request(format!("{}/videos", base))?;
    let recommendations = part_request(format!("{}/recommendations", base))?;

    debug!(media_type = %media_type, id = id, "Fetching media bundle");

    let result = tokio::try_join!(
        fetch_part(fetcher, &details),
        fetch_part(fetcher, &credits),
        fetch_part(fetcher, &videos),
        fetch_part(fetcher, &recommendations),
    );

    match result {
        Ok((details, credits, videos, recommendations)) => Ok(Bundle {
            details,
            credits,
            videos,
            recommendations,
        }),
        Err(e) => {
            warn!(media_type = %media_type, id = id, error = %e, "Media bundle failed");
            Err(GatewayError::aggregation(base, e))
        }
    }
}

fn part_request(path: String) -> GatewayResult<UpstreamRequest> {
    let params = QueryParams::new().with("language", BUNDLE_LANGUAGE);
    Ok(UpstreamRequest::new(path, params)?)
}

async fn fetch_part(fetcher: &dyn CatalogFetcher, request: &UpstreamRequest) -> GatewayResult<CatalogPayload> {
    Ok(fetcher.fetch(request).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{UpstreamError, UpstreamResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers every path with `{"path": "<path>"}` unless the path is listed as failing
    struct ScriptedFetcher {
        failing: Vec<&'static str>,
        seen: Mutex<Vec<UpstreamRequest>>,
    }

    impl ScriptedFetcher {
        fn new(failing: Vec<&'static str>) -> Self {
            Self {
                failing,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CatalogFetcher for ScriptedFetcher {
        async fn fetch(&self, request: &UpstreamRequest) -> UpstreamResult<CatalogPayload> {
            self.seen.lock().unwrap().push(request.clone());
            if self.failing.contains(&request.path()) {
                return Err(UpstreamError::Exhausted {
                    path: request.path().to_string(),
                    attempts: 3,
                    last: Box::new(UpstreamError::Status { status: 404 }),
                });
            }
            Ok(CatalogPayload::from_value(&serde_json::json!({ "path": request.path() })).unwrap())
        }
    }

    #[test]
    fn test_media_type_parsing() {
        assert_eq!("movie".parse::<MediaType>().unwrap(), MediaType::Movie);
        assert_eq!("tv".parse::<MediaType>().unwrap(), MediaType::Tv);
        assert!(matches!(
            "person".parse::<MediaType>(),
            Err(GatewayError::RequestValidation { .. })
        ));
        assert_eq!(MediaType::default(), MediaType::Movie);
    }

    #[tokio::test]
    async fn test_bundle_issues_four_calls() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let bundle = bundle(&fetcher, MediaType::Movie, 550).await.unwrap();

        assert_eq!(bundle.details.as_str(), r#"{"path":"movie/550"}"#);
        assert_eq!(bundle.credits.as_str(), r#"{"path":"movie/550/credits"}"#);
        assert_eq!(bundle.videos.as_str(), r#"{"path":"movie/550/videos"}"#);
        assert_eq!(bundle.recommendations.as_str(), r#"{"path":"movie/550/recommendations"}"#);

        let seen = fetcher.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|r| r.params().get("language") == Some("en-US")));
    }

    #[tokio::test]
    async fn test_one_failed_part_fails_the_bundle() {
        let fetcher = ScriptedFetcher::new(vec!["tv/1399/videos"]);
        let err = bundle(&fetcher, MediaType::Tv, 1399).await.unwrap_err();

        match &err {
            GatewayError::AggregationFailed { resource, status, .. } => {
                assert_eq!(resource, "tv/1399");
                assert_eq!(*status, Some(404));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_bundle_serializes_parts_verbatim() {
        let part = |text: &str| CatalogPayload::from_slice(text.as_bytes()).unwrap();
        let bundle = Bundle {
            details: part(r#"{"id":550,"title":"Fight Club"}"#),
            credits: part(r#"{"cast":[]}"#),
            videos: part(r#"{"results":[]}"#),
            recommendations: part(r#"{"page":1}"#),
        };

        assert_eq!(
            serde_json::to_string(&bundle).unwrap(),
            r#"{"details":{"id":550,"title":"Fight Club"},"credits":{"cast":[]},"videos":{"results":[]},"recommendations":{"page":1}}"#
        );
    }
}
