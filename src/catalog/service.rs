//! Catalog operations: discover, media bundle and search, each behind the cache wrap.

use super::media::{self, Bundle, MediaType};
use crate::caching::{CacheKey, CacheWrap};
use crate::core::config::CacheTtlConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::upstream::{CatalogFetcher, CatalogPayload, QueryParams, UpstreamRequest};
use std::sync::Arc;
use tracing::instrument;

/// Defaults laid down before caller filters on discover and search calls
const DEFAULT_INCLUDE_ADULT: &str = "false";
const DEFAULT_LANGUAGE: &str = "en-US";

/// Entry point used by the HTTP handlers
pub struct CatalogService {
    fetcher: Arc<dyn CatalogFetcher>,
    cache: Arc<CacheWrap>,
    ttl: CacheTtlConfig,
    max_key_length: usize,
}

impl CatalogService {
    pub fn new(
        fetcher: Arc<dyn CatalogFetcher>,
        cache: Arc<CacheWrap>,
        ttl: CacheTtlConfig,
        max_key_length: usize,
    ) -> Self {
        Self {
            fetcher,
            cache,
            ttl,
            max_key_length,
        }
    }

    pub fn cache(&self) -> &Arc<CacheWrap> {
        &self.cache
    }

    /// Browse by filters. Caller filters override the `include_adult` and
    /// `language` defaults; the cache key covers the caller filters only.
    #[instrument(skip(self, filters))]
    pub async fn discover(&self, media_type: MediaType, filters: QueryParams) -> GatewayResult<CatalogPayload> {
        let key = CacheKey::discover(media_type.as_str(), &filters).with_max_length(self.max_key_length);

        let mut params = QueryParams::new()
            .with("include_adult", DEFAULT_INCLUDE_ADULT)
            .with("language", DEFAULT_LANGUAGE);
        params.extend(filters.iter());

        let request = UpstreamRequest::new(format!("discover/{}", media_type), params)?;
        let fetcher = self.fetcher.clone();

        self.cache
            .wrap(key.as_str(), self.ttl.discover, || async move {
                fetcher.fetch(&request).await.map_err(GatewayError::from)
            })
            .await
    }

    /// Details, credits, videos and recommendations for one title
    #[instrument(skip(self))]
    pub async fn media(&self, media_type: MediaType, id: u64) -> GatewayResult<Bundle> {
        let key = CacheKey::media(media_type.as_str(), id).with_max_length(self.max_key_length);
        let fetcher = self.fetcher.clone();

        self.cache
            .wrap(key.as_str(), self.ttl.media, move || async move {
                media::bundle(fetcher.as_ref(), media_type, id).await
            })
            .await
    }

    /// Multi-type text search; `include_adult` and `language` are always forced
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, page: u32) -> GatewayResult<CatalogPayload> {
        if page == 0 {
            return Err(GatewayError::validation("page", "must be a positive integer"));
        }

        let key = CacheKey::search(query, page).with_max_length(self.max_key_length);
        let params = QueryParams::new()
            .with("query", query)
            .with("page", page.to_string())
            .with("include_adult", DEFAULT_INCLUDE_ADULT)
            .with("language", DEFAULT_LANGUAGE);

        let request = UpstreamRequest::new("search/multi", params)?;
        let fetcher = self.fetcher.clone();

        self.cache
            .wrap(key.as_str(), self.ttl.search, || async move {
                fetcher.fetch(&request).await.map_err(GatewayError::from)
            })
            .await
    }
}
