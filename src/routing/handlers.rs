//! # Proxy Handlers Module
//!
//! The upstream proxy endpoints of the Weathervane gateway. Every handler
//! follows the same contract:
//!
//! 1. Call the rate-limit guard; a rejection short-circuits with 429
//! 2. Normalize the cache key for the request
//! 3. Serve a cache hit with `X-Cache: HIT` and the rate-limit headers
//! 4. On miss, fetch the upstream with the shared bounded-timeout client
//! 5. Populate the cache only when the fetch succeeded, respond `MISS`
//! 6. On upstream failure respond 502 without caching; the request already
//!    charged to the rate limiter is not refunded
//!
//! Handlers never panic on bad upstream data; anything that is not a
//! well-formed success is a 502.

use crate::cache::coordinate_key;
use crate::rate_limiter::middleware::guard;
use crate::server::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

///////////////////////////////////////////////////////////////////////////////
//****                         Public Structs                            ****//
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Deserialize)]
pub struct CoordinateParams {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
pub struct WeatherParams {
    pub lat: f64,
    pub lon: f64,
    pub units: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MetarParams {
    pub station: String,
}

#[derive(Debug, Deserialize)]
pub struct NewsParams {
    pub q: Option<String>,
    pub category: Option<String>,
}

enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
//****                       Public Functions                            ****//
///////////////////////////////////////////////////////////////////////////////

/// GET /api/weather?lat&lon[&units]
pub async fn handle_weather(
    State(state): State<AppState>,
    Query(params): Query<WeatherParams>,
    headers: HeaderMap,
) -> Response {
    let request_id = Uuid::new_v4();
    let guard = match guard(&state.rate_limiter, state.session_resolver.as_ref(), &headers) {
        Ok(guard) => guard,
        Err(rejection) => return rejection,
    };

    let units = params.units.as_deref().unwrap_or("metric");
    let cache_key = format!("{}:{}", coordinate_key(params.lat, params.lon), units);

    if let Some(cached) = state.caches.weather.get(&cache_key) {
        info!(request_id = %request_id, client_key = %guard.client_key, cache_key = %cache_key, "weather cache hit");
        return json_response(cached, &guard.headers, CacheStatus::Hit);
    }

    info!(request_id = %request_id, client_key = %guard.client_key, cache_key = %cache_key, "weather cache miss, fetching upstream");

    let mut request = state
        .http_client
        .get(format!("{}/weather", state.config.weather_upstream_url))
        .query(&[
            ("lat", params.lat.to_string()),
            ("lon", params.lon.to_string()),
            ("units", units.to_string()),
        ]);
    if let Some(key) = &state.config.openweather_api_key {
        request = request.query(&[("appid", key.as_str())]);
    }

    match fetch_json(request, request_id, "weather").await {
        Ok(payload) => {
            state
                .caches
                .weather
                .insert(cache_key, payload.clone(), state.config.weather_cache_ttl_secs);
            json_response(payload, &guard.headers, CacheStatus::Miss)
        }
        Err(()) => upstream_error(&guard.headers),
    }
}

/// GET /api/metar?station
///
/// METAR reports are raw text; the payload passes through verbatim.
pub async fn handle_metar(
    State(state): State<AppState>,
    Query(params): Query<MetarParams>,
    headers: HeaderMap,
) -> Response {
    let request_id = Uuid::new_v4();
    let guard = match guard(&state.rate_limiter, state.session_resolver.as_ref(), &headers) {
        Ok(guard) => guard,
        Err(rejection) => return rejection,
    };

    let cache_key = params.station.clone();

    if let Some(cached) = state.caches.metar.get(&cache_key) {
        info!(request_id = %request_id, client_key = %guard.client_key, cache_key = %cache_key, "metar cache hit");
        return text_response(cached, &guard.headers, CacheStatus::Hit);
    }

    info!(request_id = %request_id, client_key = %guard.client_key, cache_key = %cache_key, "metar cache miss, fetching upstream");

    let request = state
        .http_client
        .get(&state.config.metar_upstream_url)
        .query(&[("ids", params.station.as_str()), ("format", "raw")]);

    let result = async {
        let response = request.send().await?;
        response.error_for_status()?.text().await
    }
    .await;

    match result {
        Ok(report) => {
            state
                .caches
                .metar
                .insert(cache_key, report.clone(), state.config.metar_cache_ttl_secs);
            text_response(report, &guard.headers, CacheStatus::Miss)
        }
        Err(e) => {
            warn!(request_id = %request_id, "metar upstream request failed: {}", e);
            upstream_error(&guard.headers)
        }
    }
}

/// GET /api/precipitation?lat&lon
pub async fn handle_precipitation(
    State(state): State<AppState>,
    Query(params): Query<CoordinateParams>,
    headers: HeaderMap,
) -> Response {
    let request_id = Uuid::new_v4();
    let guard = match guard(&state.rate_limiter, state.session_resolver.as_ref(), &headers) {
        Ok(guard) => guard,
        Err(rejection) => return rejection,
    };

    let cache_key = coordinate_key(params.lat, params.lon);

    if let Some(cached) = state.caches.precipitation.get(&cache_key) {
        info!(request_id = %request_id, client_key = %guard.client_key, cache_key = %cache_key, "precipitation cache hit");
        return json_response(cached, &guard.headers, CacheStatus::Hit);
    }

    info!(request_id = %request_id, client_key = %guard.client_key, cache_key = %cache_key, "precipitation cache miss, fetching upstream");

    let request = state
        .http_client
        .get(&state.config.precipitation_upstream_url)
        .query(&[
            ("latitude", params.lat.to_string()),
            ("longitude", params.lon.to_string()),
            ("hourly", "precipitation".to_string()),
        ]);

    match fetch_json(request, request_id, "precipitation").await {
        Ok(payload) => {
            state.caches.precipitation.insert(
                cache_key,
                payload.clone(),
                state.config.precipitation_cache_ttl_secs,
            );
            json_response(payload, &guard.headers, CacheStatus::Miss)
        }
        Err(()) => upstream_error(&guard.headers),
    }
}

/// GET /api/precipitation/history?lat&lon
///
/// History lines are scoped to the caller: the cache key is prefixed with the
/// resolved client key, so one user's history never leaks to another.
pub async fn handle_precipitation_history(
    State(state): State<AppState>,
    Query(params): Query<CoordinateParams>,
    headers: HeaderMap,
) -> Response {
    let request_id = Uuid::new_v4();
    let guard = match guard(&state.rate_limiter, state.session_resolver.as_ref(), &headers) {
        Ok(guard) => guard,
        Err(rejection) => return rejection,
    };

    let cache_key = format!(
        "{}:{}",
        guard.client_key,
        coordinate_key(params.lat, params.lon)
    );

    if let Some(cached) = state.caches.precipitation.get(&cache_key) {
        info!(request_id = %request_id, client_key = %guard.client_key, cache_key = %cache_key, "precipitation history cache hit");
        return json_response(cached, &guard.headers, CacheStatus::Hit);
    }

    info!(request_id = %request_id, client_key = %guard.client_key, cache_key = %cache_key, "precipitation history cache miss, fetching upstream");

    let request = state
        .http_client
        .get(&state.config.precipitation_upstream_url)
        .query(&[
            ("latitude", params.lat.to_string()),
            ("longitude", params.lon.to_string()),
            ("hourly", "precipitation".to_string()),
            ("past_days", "7".to_string()),
        ]);

    match fetch_json(request, request_id, "precipitation history").await {
        Ok(payload) => {
            state.caches.precipitation.insert(
                cache_key,
                payload.clone(),
                state.config.precipitation_history_cache_ttl_secs,
            );
            json_response(payload, &guard.headers, CacheStatus::Miss)
        }
        Err(()) => upstream_error(&guard.headers),
    }
}

/// GET /api/pollen?lat&lon
pub async fn handle_pollen(
    State(state): State<AppState>,
    Query(params): Query<CoordinateParams>,
    headers: HeaderMap,
) -> Response {
    let request_id = Uuid::new_v4();
    let guard = match guard(&state.rate_limiter, state.session_resolver.as_ref(), &headers) {
        Ok(guard) => guard,
        Err(rejection) => return rejection,
    };

    let cache_key = coordinate_key(params.lat, params.lon);

    if let Some(cached) = state.caches.pollen.get(&cache_key) {
        info!(request_id = %request_id, client_key = %guard.client_key, cache_key = %cache_key, "pollen cache hit");
        return json_response(cached, &guard.headers, CacheStatus::Hit);
    }

    info!(request_id = %request_id, client_key = %guard.client_key, cache_key = %cache_key, "pollen cache miss, fetching upstream");

    let mut request = state
        .http_client
        .get(&state.config.pollen_upstream_url)
        .query(&[
            ("location.latitude", params.lat.to_string()),
            ("location.longitude", params.lon.to_string()),
            ("days", "1".to_string()),
        ]);
    if let Some(key) = &state.config.pollen_api_key {
        request = request.query(&[("key", key.as_str())]);
    }

    match fetch_json(request, request_id, "pollen").await {
        Ok(payload) => {
            state
                .caches
                .pollen
                .insert(cache_key, payload.clone(), state.config.pollen_cache_ttl_secs);
            json_response(payload, &guard.headers, CacheStatus::Miss)
        }
        Err(()) => upstream_error(&guard.headers),
    }
}

/// GET /api/news[?q][&category]
pub async fn handle_news(
    State(state): State<AppState>,
    Query(params): Query<NewsParams>,
    headers: HeaderMap,
) -> Response {
    let request_id = Uuid::new_v4();
    let guard = match guard(&state.rate_limiter, state.session_resolver.as_ref(), &headers) {
        Ok(guard) => guard,
        Err(rejection) => return rejection,
    };

    let cache_key = format!(
        "{}|{}",
        params.q.as_deref().unwrap_or(""),
        params.category.as_deref().unwrap_or("")
    );

    if let Some(cached) = state.caches.news.get(&cache_key) {
        info!(request_id = %request_id, client_key = %guard.client_key, cache_key = %cache_key, "news cache hit");
        return json_response(cached, &guard.headers, CacheStatus::Hit);
    }

    info!(request_id = %request_id, client_key = %guard.client_key, cache_key = %cache_key, "news cache miss, fetching upstream");

    let mut request = state.http_client.get(&state.config.news_upstream_url);
    if let Some(q) = &params.q {
        request = request.query(&[("q", q.as_str())]);
    }
    if let Some(category) = &params.category {
        request = request.query(&[("category", category.as_str())]);
    }
    if let Some(key) = &state.config.news_api_key {
        request = request.query(&[("apiKey", key.as_str())]);
    }

    match fetch_json(request, request_id, "news").await {
        Ok(payload) => {
            state
                .caches
                .news
                .insert(cache_key, payload.clone(), state.config.news_cache_ttl_secs);
            json_response(payload, &guard.headers, CacheStatus::Miss)
        }
        Err(()) => upstream_error(&guard.headers),
    }
}

/// GET /health — not rate limited, never cached
pub async fn handle_health() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

///////////////////////////////////////////////////////////////////////////////
//****                      Private Functions                            ****//
///////////////////////////////////////////////////////////////////////////////

/// Send an upstream request expecting a JSON payload
///
/// Any transport error, non-2xx status, or unparseable body is logged and
/// reported as a failure; the caller turns it into a 502.
async fn fetch_json(
    request: reqwest::RequestBuilder,
    request_id: Uuid,
    upstream: &str,
) -> Result<serde_json::Value, ()> {
    let result = async {
        let response = request.send().await?;
        response.error_for_status()?.json::<serde_json::Value>().await
    }
    .await;

    result.map_err(|e| {
        warn!(request_id = %request_id, "{} upstream request failed: {}", upstream, e);
    })
}

fn json_response(payload: serde_json::Value, headers: &HeaderMap, status: CacheStatus) -> Response {
    let mut response = Json(payload).into_response();
    decorate(response.headers_mut(), headers, status);
    response
}

fn text_response(payload: String, headers: &HeaderMap, status: CacheStatus) -> Response {
    let mut response = payload.into_response();
    decorate(response.headers_mut(), headers, status);
    response
}

/// Upstream failure where rate-limit headers are already known
fn upstream_error(headers: &HeaderMap) -> Response {
    let mut response = (
        StatusCode::BAD_GATEWAY,
        Json(json!({
            "error": "Bad Gateway",
            "message": "Upstream request failed",
        })),
    )
        .into_response();
    decorate(response.headers_mut(), headers, CacheStatus::Miss);
    response
}

fn decorate(response_headers: &mut HeaderMap, rate_limit_headers: &HeaderMap, status: CacheStatus) {
    response_headers.extend(rate_limit_headers.clone());
    response_headers.insert("x-cache", HeaderValue::from_static(status.as_str()));
}
