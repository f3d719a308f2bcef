//! End-to-end tests for the Weathervane gateway
//!
//! Each test boots a stub upstream server on an ephemeral port, points the
//! gateway's upstream URLs at it, and drives the gateway over real HTTP with
//! `reqwest`. The stubs count how often they are hit so the tests can prove
//! that cache hits never reach the upstream.

use crate::env::AppConfig;
use crate::routing::router::create_router;
use crate::server::build_state;
use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Stub upstream shared state: request counter plus how many initial
/// requests should fail with a 500.
#[derive(Clone)]
struct StubState {
    hits: Arc<AtomicUsize>,
    fail_first: Arc<AtomicUsize>,
}

async fn stub_json(State(state): State<StubState>) -> Result<Json<serde_json::Value>, StatusCode> {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst);
    if hit < state.fail_first.load(Ordering::SeqCst) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!({"payload": "ok", "hit": hit})))
}

async fn stub_metar(State(state): State<StubState>) -> String {
    state.hits.fetch_add(1, Ordering::SeqCst);
    "METAR KJFK 291651Z 18010KT 10SM FEW250 24/12 A3012".to_string()
}

async fn start_stub_upstream(fail_first: usize) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = StubState {
        hits: hits.clone(),
        fail_first: Arc::new(AtomicUsize::new(fail_first)),
    };

    let app = Router::new()
        .route("/weather", get(stub_json))
        .route("/data", get(stub_json))
        .route("/metar", get(stub_metar))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, hits)
}

/// Gateway config pointing every upstream at the stub, with tight limits so
/// the 429 path is reachable without hundreds of requests.
fn test_config(upstream: SocketAddr) -> AppConfig {
    let base = format!("http://{}", upstream);
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        bind_address: "127.0.0.1:0".parse().unwrap(),
        log_level: "weathervane=debug".to_string(),
        rate_limit_hourly: 50,
        rate_limit_burst: 3,
        rate_limit_burst_window_ms: 300_000,
        sweep_interval_secs: 60,
        session_jwt_secret: None,
        upstream_timeout_secs: 5,
        weather_upstream_url: base.clone(),
        metar_upstream_url: format!("{}/metar", base),
        precipitation_upstream_url: format!("{}/data", base),
        pollen_upstream_url: format!("{}/data", base),
        news_upstream_url: format!("{}/data", base),
        openweather_api_key: None,
        pollen_api_key: None,
        news_api_key: None,
        weather_cache_ttl_secs: 300,
        metar_cache_ttl_secs: 600,
        precipitation_cache_ttl_secs: 900,
        precipitation_history_cache_ttl_secs: 3600,
        pollen_cache_ttl_secs: 3600,
        news_cache_ttl_secs: 900,
    }
}

async fn start_gateway(upstream: SocketAddr) -> SocketAddr {
    let state = build_state(test_config(upstream)).unwrap();
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_weather_miss_then_hit() {
    let (upstream, hits) = start_stub_upstream(0).await;
    let gateway = start_gateway(upstream).await;
    let client = reqwest::Client::new();

    let url = format!("http://{}/api/weather?lat=40.7128&lon=-74.0059", gateway);

    let first = client
        .get(&url)
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(first.headers()["x-ratelimit-limit"], "50");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "49");

    // Nearby coordinates collapse onto the same cache line
    let second = client
        .get(format!(
            "http://{}/api/weather?lat=40.7129&lon=-74.0061",
            gateway
        ))
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.headers()["x-ratelimit-remaining"], "48");

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_burst_exhaustion_returns_429() {
    let (upstream, _hits) = start_stub_upstream(0).await;
    let gateway = start_gateway(upstream).await;
    let client = reqwest::Client::new();

    // Distinct stations so every request is a cache miss; the limiter is
    // charged either way.
    for station in ["KJFK", "KLGA", "KEWR"] {
        let response = client
            .get(format!("http://{}/api/metar?station={}", gateway, station))
            .header("x-forwarded-for", "198.51.100.2")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    let blocked = client
        .get(format!("http://{}/api/metar?station=KBOS", gateway))
        .header("x-forwarded-for", "198.51.100.2")
        .send()
        .await
        .unwrap();

    assert_eq!(blocked.status(), 429);
    assert_eq!(blocked.headers()["x-ratelimit-burst-remaining"], "0");
    assert_eq!(blocked.headers()["cache-control"], "no-store");
    assert!(blocked.headers().contains_key("retry-after"));

    let body: serde_json::Value = blocked.json().await.unwrap();
    assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(body["burstLimit"], 3);
    assert_eq!(body["burstRemaining"], 0);

    // A different client is unaffected
    let other = client
        .get(format!("http://{}/api/metar?station=KBOS", gateway))
        .header("x-forwarded-for", "203.0.113.77")
        .send()
        .await
        .unwrap();
    assert_eq!(other.status(), 200);
}

#[tokio::test]
async fn test_upstream_failure_is_not_cached() {
    let (upstream, hits) = start_stub_upstream(1).await;
    let gateway = start_gateway(upstream).await;
    let client = reqwest::Client::new();

    let url = format!("http://{}/api/precipitation?lat=51.5&lon=-0.12", gateway);

    let failed = client
        .get(&url)
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(failed.status(), 502);
    assert_eq!(failed.headers()["x-cache"], "MISS");

    // Retry reaches the upstream again (the failure was not cached), succeeds
    let retried = client
        .get(&url)
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(retried.status(), 200);
    assert_eq!(retried.headers()["x-cache"], "MISS");

    let hit = client
        .get(&url)
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(hit.status(), 200);
    assert_eq!(hit.headers()["x-cache"], "HIT");

    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_history_is_scoped_per_client() {
    let (upstream, hits) = start_stub_upstream(0).await;
    let gateway = start_gateway(upstream).await;
    let client = reqwest::Client::new();

    let url = format!(
        "http://{}/api/precipitation/history?lat=51.5&lon=-0.12",
        gateway
    );

    let first = client
        .get(&url)
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(first.headers()["x-cache"], "MISS");

    // Same coordinates from a different client: its own cache line
    let other_client = client
        .get(&url)
        .header("x-forwarded-for", "198.51.100.2")
        .send()
        .await
        .unwrap();
    assert_eq!(other_client.headers()["x-cache"], "MISS");

    let repeat = client
        .get(&url)
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(repeat.headers()["x-cache"], "HIT");

    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_metar_text_passthrough() {
    let (upstream, _hits) = start_stub_upstream(0).await;
    let gateway = start_gateway(upstream).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{}/api/metar?station=KJFK", gateway))
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.starts_with("METAR KJFK"));
}

#[tokio::test]
async fn test_health_is_not_rate_limited() {
    let (upstream, _hits) = start_stub_upstream(0).await;
    let gateway = start_gateway(upstream).await;
    let client = reqwest::Client::new();

    for _ in 0..10 {
        let response = client
            .get(format!("http://{}/health", gateway))
            .header("x-forwarded-for", "203.0.113.50")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }
}

#[tokio::test]
async fn test_missing_coordinates_is_a_client_error() {
    let (upstream, hits) = start_stub_upstream(0).await;
    let gateway = start_gateway(upstream).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{}/api/weather?lat=40.7", gateway))
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
