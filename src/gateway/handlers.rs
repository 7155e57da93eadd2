//! # HTTP Handlers
//!
//! Thin adapters between axum and [`CatalogService`]: parse and validate inbound
//! parameters, call the service, and return the JSON body as produced.

use super::server::AppState;
use crate::catalog::{CatalogService, MediaType};
use crate::core::error::{GatewayError, GatewayResult};
use crate::upstream::QueryParams;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

/// Parse a raw query string; a key given twice keeps its last value
pub fn parse_query(raw: Option<&str>) -> QueryParams {
    raw.map(|query| url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn json_body(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// `GET /v1/discover?type={movie|tv}&<filters>`
pub async fn discover(State(state): State<AppState>, RawQuery(query): RawQuery) -> GatewayResult<Response> {
    let mut filters = parse_query(query.as_deref());
    let media_type = match filters.remove("type") {
        Some(value) => value.parse::<MediaType>()?,
        None => MediaType::default(),
    };

    let payload = state.catalog.discover(media_type, filters).await?;
    Ok(json_body(payload.as_str().to_string()))
}

/// `GET /v1/media/{type}/{id}`
pub async fn media(
    State(state): State<AppState>,
    Path((media_type, id)): Path<(String, String)>,
) -> GatewayResult<Response> {
    let media_type = media_type.parse::<MediaType>()?;
    let id = id
        .parse::<u64>()
        .map_err(|_| GatewayError::validation("id", format!("expected a numeric id, got '{}'", id)))?;

    let bundle = state.catalog.media(media_type, id).await?;
    Ok(json_body(serde_json::to_string(&bundle)?))
}

/// `GET /v1/search?q={text}&page={n}`
pub async fn search(State(state): State<AppState>, RawQuery(query): RawQuery) -> GatewayResult<Response> {
    let params = parse_query(query.as_deref());
    let text = params.get("q").unwrap_or_default();
    let page = match params.get("page") {
        Some(value) => value
            .parse::<u32>()
            .ok()
            .filter(|page| *page > 0)
            .ok_or_else(|| GatewayError::validation("page", format!("expected a positive integer, got '{}'", value)))?,
        None => 1,
    };

    let payload = state.catalog.search(text, page).await?;
    Ok(json_body(payload.as_str().to_string()))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let catalog: &CatalogService = &state.catalog;
    let store = catalog.cache().store();

    let healthy = match store.health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            warn!(backend = store.backend(), error = %e, "Cache health check failed");
            false
        }
    };
    let stats = catalog.cache().stats();

    let body = json!({
        "status": if healthy { "ok" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "cache": {
            "backend": store.backend(),
            "healthy": healthy,
            "hits": stats.hits,
            "misses": stats.misses,
            "writes": stats.writes,
        }
    });

    (StatusCode::OK, Json(body))
}
