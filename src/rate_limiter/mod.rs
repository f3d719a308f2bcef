//! Rate limiting module for Weathervane
//!
//! Every proxied route shares one in-memory store that enforces two fixed
//! windows per client key: an hourly ceiling sized for sustained use and a
//! short burst ceiling that stops rapid-fire scripts long before the hourly
//! budget runs out. A normal interactive user never sees either limit.
//!
//! # Behavior
//!
//! - **Dual fixed windows**: 120 requests/hour and 30 requests/5 minutes by
//!   default, tunable via `WEATHER_RATE_LIMIT_HOURLY`,
//!   `WEATHER_RATE_LIMIT_BURST`, and `WEATHER_RATE_LIMIT_BURST_WINDOW_MS`
//! - **Lazy expiry**: windows roll over when a request arrives after the
//!   window end; an idle client costs nothing
//! - **Non-incrementing rejections**: a blocked request does not consume
//!   budget, so a client that keeps retrying is admitted the moment a window
//!   rolls over
//! - **Periodic sweep**: a background task deletes entries whose hourly
//!   window has passed
//!
//! The check is a single read-modify-write under one mutex with no await
//! inside, so two concurrent requests for the same key can never both be
//! admitted on the last remaining slot.

pub mod middleware;

use crate::identity::ClientKey;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

///////////////////////////////////////////////////////////////////////////////
//****                         Public Structs                            ****//
///////////////////////////////////////////////////////////////////////////////

/// Rate limiter tuning
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub hourly_limit: u32,
    pub burst_limit: u32,
    pub hourly_window_ms: i64,
    pub burst_window_ms: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            hourly_limit: 120,
            burst_limit: 30,
            hourly_window_ms: 3_600_000,
            burst_window_ms: 300_000,
        }
    }
}

/// Per-client window state
///
/// Only counters and window ends are stored; everything the caller sees is
/// derived at check time.
#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    reset_at_ms: i64,
    burst_count: u32,
    burst_reset_at_ms: i64,
}

/// Outcome of one rate-limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: i64,
    pub burst_limit: u32,
    pub burst_remaining: u32,
    pub burst_reset_at_ms: i64,
}

/// Shared rate-limit store, one per process
#[derive(Debug)]
pub struct RateLimitStore {
    config: RateLimitConfig,
    entries: Mutex<HashMap<ClientKey, RateLimitEntry>>,
}

///////////////////////////////////////////////////////////////////////////////
//****                       Public Functions                            ****//
///////////////////////////////////////////////////////////////////////////////

impl RateLimitStore {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record one request for the given client key
    pub fn check(&self, key: &ClientKey) -> RateLimitResult {
        self.check_at(key, now_ms())
    }

    fn check_at(&self, key: &ClientKey, now_ms: i64) -> RateLimitResult {
        let mut entries = self.entries.lock().unwrap();

        let entry = entries.entry(key.clone()).or_insert_with(|| {
            debug!(client_key = %key, "starting new rate limit windows");
            RateLimitEntry {
                count: 0,
                reset_at_ms: now_ms + self.config.hourly_window_ms,
                burst_count: 0,
                burst_reset_at_ms: now_ms + self.config.burst_window_ms,
            }
        });

        // Hourly rollover resets both windows: a client absent for an hour
        // starts completely fresh.
        if now_ms >= entry.reset_at_ms {
            entry.count = 0;
            entry.reset_at_ms = now_ms + self.config.hourly_window_ms;
            entry.burst_count = 0;
            entry.burst_reset_at_ms = now_ms + self.config.burst_window_ms;
        } else if now_ms >= entry.burst_reset_at_ms {
            entry.burst_count = 0;
            entry.burst_reset_at_ms = now_ms + self.config.burst_window_ms;
        }

        // Burst is checked first so a caller blocked by both windows is told
        // the shorter retry delay. Rejections leave the counters untouched.
        let allowed =
            entry.burst_count < self.config.burst_limit && entry.count < self.config.hourly_limit;

        if allowed {
            entry.count += 1;
            entry.burst_count += 1;
        } else {
            debug!(
                client_key = %key,
                count = entry.count,
                burst_count = entry.burst_count,
                "rate limit exceeded"
            );
        }

        RateLimitResult {
            allowed,
            limit: self.config.hourly_limit,
            remaining: self.config.hourly_limit.saturating_sub(entry.count),
            reset_at_ms: entry.reset_at_ms,
            burst_limit: self.config.burst_limit,
            burst_remaining: self.config.burst_limit.saturating_sub(entry.burst_count),
            burst_reset_at_ms: entry.burst_reset_at_ms,
        }
    }

    /// Delete entries whose hourly window has passed
    pub fn sweep(&self) {
        self.sweep_at(now_ms());
    }

    fn sweep_at(&self, now_ms: i64) {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| now_ms < entry.reset_at_ms);
        let removed = before - entries.len();
        if removed > 0 {
            info!(
                "Rate limit sweep removed {} expired entries, {} remaining",
                removed,
                entries.len()
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
