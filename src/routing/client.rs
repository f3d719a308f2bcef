//! # HTTP Client Module
//!
//! Creates the shared upstream HTTP client used by every proxy handler.
//! One client, built once at startup, so connection pooling works across
//! requests and every upstream call inherits the same timeouts.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::info;

/// Create the upstream HTTP client with timeouts and a user agent
pub fn create_upstream_client(
    timeout_secs: u64,
) -> Result<Client, Box<dyn std::error::Error + Send + Sync>> {
    info!(
        "Creating upstream HTTP client - timeout: {}s, connect_timeout: 3s",
        timeout_secs
    );

    let client = ClientBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(3))
        .user_agent(concat!("weathervane/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(3))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()?;

    Ok(client)
}
