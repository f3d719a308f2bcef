//! Weathervane — a rate-limited, cache-fronted weather proxy gateway
//!
//! Fronts a set of third-party weather, aviation, pollen, and news APIs with
//! per-client rate limiting and short-TTL response caching so that browser
//! clients can hammer refresh without exhausting upstream API quotas.

mod auth;
mod cache;
mod cli;
mod env;
mod identity;
mod rate_limiter;
mod routing;
mod server;

#[cfg(test)]
mod tests;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("weathervane=info,tower_http=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    cli::run().await;
}
