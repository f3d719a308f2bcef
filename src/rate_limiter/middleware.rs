//! Rate-limit guard for the proxy handlers
//!
//! Handlers call [`guard`] before doing any work. On success they get back
//! the resolved client key plus the informational `X-RateLimit-*` headers to
//! attach to their response; on rejection they get a ready-made 429 response
//! to return as-is.
//!
//! The 429 body is structured JSON (camelCase keys) so browser clients can
//! render a useful message, and `Retry-After` reflects whichever window
//! actually blocked the request.

use crate::identity::{ClientKey, resolve_client_key};
use crate::rate_limiter::{RateLimitResult, RateLimitStore};
use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::warn;

use crate::auth::SessionResolver;

///////////////////////////////////////////////////////////////////////////////
//****                         Public Structs                            ****//
///////////////////////////////////////////////////////////////////////////////

/// A passed rate-limit check
pub struct RateLimitGuard {
    pub client_key: ClientKey,
    /// Informational headers to merge into the handler's response
    pub headers: HeaderMap,
}

/// JSON body of a 429 response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitRejection {
    error: &'static str,
    code: &'static str,
    message: String,
    retry_after: i64,
    limit: u32,
    remaining: u32,
    burst_limit: u32,
    burst_remaining: u32,
}

///////////////////////////////////////////////////////////////////////////////
//****                       Public Functions                            ****//
///////////////////////////////////////////////////////////////////////////////

/// Resolve the caller, charge one request, and either admit or reject
pub fn guard(
    store: &RateLimitStore,
    resolver: &dyn SessionResolver,
    headers: &HeaderMap,
) -> Result<RateLimitGuard, Response> {
    let client_key = resolve_client_key(headers, resolver);
    let result = store.check(&client_key);

    if result.allowed {
        Ok(RateLimitGuard {
            headers: rate_limit_headers(&result),
            client_key,
        })
    } else {
        warn!(
            client_key = %client_key,
            remaining = result.remaining,
            burst_remaining = result.burst_remaining,
            "request rejected by rate limiter"
        );
        Err(rejection_response(&result, chrono::Utc::now().timestamp_millis()))
    }
}

/// Build the informational `X-RateLimit-*` header set
///
/// Reset values are epoch seconds, matching the conventional header format.
pub fn rate_limit_headers(result: &RateLimitResult) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_num(&mut headers, "x-ratelimit-limit", result.limit as i64);
    insert_num(&mut headers, "x-ratelimit-remaining", result.remaining as i64);
    insert_num(&mut headers, "x-ratelimit-reset", result.reset_at_ms / 1000);
    insert_num(
        &mut headers,
        "x-ratelimit-burst-limit",
        result.burst_limit as i64,
    );
    insert_num(
        &mut headers,
        "x-ratelimit-burst-remaining",
        result.burst_remaining as i64,
    );
    insert_num(
        &mut headers,
        "x-ratelimit-burst-reset",
        result.burst_reset_at_ms / 1000,
    );
    headers
}

fn insert_num(headers: &mut HeaderMap, name: &'static str, value: i64) {
    if let Ok(header_value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, header_value);
    }
}

fn rejection_response(result: &RateLimitResult, now_ms: i64) -> Response {
    // The burst window is the shorter one; when it caused the block, telling
    // the client to wait for the hourly reset would be wrong by up to 55 min.
    let blocking_reset_ms = if result.burst_remaining == 0 {
        result.burst_reset_at_ms
    } else {
        result.reset_at_ms
    };
    let retry_after = ((blocking_reset_ms - now_ms) + 999) / 1000;
    let retry_after = retry_after.max(0);

    let body = RateLimitRejection {
        error: "Too Many Requests",
        code: "RATE_LIMIT_EXCEEDED",
        message: format!("Rate limit exceeded. Try again in {} seconds.", retry_after),
        retry_after,
        limit: result.limit,
        remaining: result.remaining,
        burst_limit: result.burst_limit,
        burst_remaining: result.burst_remaining,
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();

    let response_headers = response.headers_mut();
    response_headers.extend(rate_limit_headers(result));
    insert_num(response_headers, "retry-after", retry_after);
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    response
}
