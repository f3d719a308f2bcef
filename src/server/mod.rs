//! Server lifecycle for the Weathervane gateway
//!
//! Builds the shared application state, starts the background sweep tasks,
//! binds the listener, and serves with graceful shutdown. All per-process
//! singletons (rate-limit store, caches, upstream client, session resolver)
//! live in [`AppState`] and are injected through axum state rather than
//! reached through globals.

pub mod shutdown;

use crate::auth::{JwtSessionResolver, SessionResolver};
use crate::cache::ResponseCaches;
use crate::env::AppConfig;
use crate::rate_limiter::{RateLimitConfig, RateLimitStore};
use crate::routing::client::create_upstream_client;
use crate::routing::router::create_router;
use shutdown::{ShutdownAwareTask, ShutdownCoordinator};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;

///////////////////////////////////////////////////////////////////////////////
//****                         Public Structs                            ****//
///////////////////////////////////////////////////////////////////////////////

/// Shared application state injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub http_client: reqwest::Client,
    pub session_resolver: Arc<dyn SessionResolver>,
    pub rate_limiter: Arc<RateLimitStore>,
    pub caches: ResponseCaches,
}

///////////////////////////////////////////////////////////////////////////////
//****                       Public Functions                            ****//
///////////////////////////////////////////////////////////////////////////////

/// Build the application state from validated configuration
pub fn build_state(config: AppConfig) -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    let http_client = create_upstream_client(config.upstream_timeout_secs)?;

    let rate_limiter = Arc::new(RateLimitStore::new(RateLimitConfig {
        hourly_limit: config.rate_limit_hourly,
        burst_limit: config.rate_limit_burst,
        burst_window_ms: config.rate_limit_burst_window_ms,
        ..RateLimitConfig::default()
    }));

    let session_resolver: Arc<dyn SessionResolver> =
        Arc::new(JwtSessionResolver::new(config.session_jwt_secret.clone()));

    Ok(AppState {
        config: Arc::new(config),
        http_client,
        session_resolver,
        rate_limiter,
        caches: ResponseCaches::new(),
    })
}

/// Start the gateway and block until shutdown completes
pub async fn start_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let bind_address = config.bind_address;
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    let state = build_state(config)?;

    let coordinator = ShutdownCoordinator::new();
    start_background_services(&coordinator, &state, sweep_interval);

    let app = create_router(state);

    info!("Starting Weathervane gateway on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;

    let signal_coordinator = coordinator.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal_coordinator.wait_for_shutdown_signal().await;
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Spawn the periodic sweep tasks for the rate-limit store and the caches
fn start_background_services(
    coordinator: &ShutdownCoordinator,
    state: &AppState,
    sweep_interval: Duration,
) {
    let rate_limiter = state.rate_limiter.clone();
    let mut rate_limit_task = ShutdownAwareTask::new(coordinator);
    tokio::spawn(async move {
        info!("Rate limit sweep task started");
        loop {
            if rate_limit_task.wait_or_shutdown(sweep_interval).await {
                info!("Rate limit sweep task shutting down");
                break;
            }
            rate_limiter.sweep();
        }
    });

    let caches = state.caches.clone();
    let mut cache_task = ShutdownAwareTask::new(coordinator);
    tokio::spawn(async move {
        info!("Cache sweep task started");
        loop {
            if cache_task.wait_or_shutdown(sweep_interval).await {
                info!("Cache sweep task shutting down");
                break;
            }
            caches.sweep_all();
        }
    });
}
