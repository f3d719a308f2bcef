//! # Router Module
//!
//! Builds the Axum router for the Weathervane gateway.
//!
//! ## Architecture
//!
//! 1. Fixed proxy routes under `/api/*`, all rate limited and cache fronted
//! 2. `/health` for liveness probes, outside the rate limiter
//! 3. Application state injection
//! 4. HTTP tracing middleware

use super::handlers::{
    handle_health, handle_metar, handle_news, handle_pollen, handle_precipitation,
    handle_precipitation_history, handle_weather,
};
use crate::server::AppState;
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

///////////////////////////////////////////////////////////////////////////////
//****                       Public Functions                            ****//
///////////////////////////////////////////////////////////////////////////////

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/weather", get(handle_weather))
        .route("/api/metar", get(handle_metar))
        .route("/api/precipitation", get(handle_precipitation))
        .route("/api/precipitation/history", get(handle_precipitation_history))
        .route("/api/pollen", get(handle_pollen))
        .route("/api/news", get(handle_news))
        .route("/health", get(handle_health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
