//! Client identifier resolution for Weathervane
//!
//! Every request that reaches a rate-limited route is attributed to exactly
//! one client key. Authenticated users share one bucket across all their
//! devices (`user:<id>`); everyone else is keyed by the best available IP
//! address (`ip:<addr>`), falling back to the shared `ip:anonymous` bucket
//! when no address can be determined.
//!
//! Resolution never fails and never rejects a request: a broken session
//! backend or garbled forwarding header just demotes the caller to the next
//! identity source in line.

use crate::auth::SessionResolver;
use axum::http::HeaderMap;
use std::fmt;
use tracing::debug;

///////////////////////////////////////////////////////////////////////////////
//****                         Public Structs                            ****//
///////////////////////////////////////////////////////////////////////////////

/// Opaque rate-limiting identity for one caller
///
/// The string form is one of `user:<id>`, `ip:<addr>`, or the literal
/// `ip:anonymous`. The prefix keeps user ids and IP addresses from ever
/// colliding in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

///////////////////////////////////////////////////////////////////////////////
//****                       Public Functions                            ****//
///////////////////////////////////////////////////////////////////////////////

impl ClientKey {
    pub fn user(id: &str) -> Self {
        Self(format!("user:{}", id))
    }

    pub fn ip(addr: &str) -> Self {
        Self(format!("ip:{}", addr))
    }

    pub fn anonymous() -> Self {
        Self("ip:anonymous".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the client key for a request
///
/// Priority: authenticated user, then the first entry of `x-forwarded-for`,
/// then `x-real-ip`, then anonymous. Session backend errors are logged and
/// treated as "no user".
pub fn resolve_client_key(headers: &HeaderMap, resolver: &dyn SessionResolver) -> ClientKey {
    match resolver.resolve(headers) {
        Ok(Some(user)) => return ClientKey::user(&user.id),
        Ok(None) => {}
        Err(e) => {
            debug!("Session resolution failed, falling back to IP: {}", e);
        }
    }

    // x-forwarded-for may carry a comma-separated chain; the first entry is
    // the original client.
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(forwarded_str) = forwarded.to_str()
        && let Some(first) = forwarded_str.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return ClientKey::ip(first);
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(real_ip_str) = real_ip.to_str()
    {
        let real_ip_str = real_ip_str.trim();
        if !real_ip_str.is_empty() {
            return ClientKey::ip(real_ip_str);
        }
    }

    ClientKey::anonymous()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, AuthenticatedUser};

    struct StubResolver(Result<Option<AuthenticatedUser>, &'static str>);

    impl SessionResolver for StubResolver {
        fn resolve(&self, _headers: &HeaderMap) -> Result<Option<AuthenticatedUser>, AuthError> {
            match &self.0 {
                Ok(user) => Ok(user.clone()),
                Err(msg) => Err((*msg).into()),
            }
        }
    }

    fn no_user() -> StubResolver {
        StubResolver(Ok(None))
    }

    #[test]
    fn test_authenticated_user_takes_precedence() {
        let resolver = StubResolver(Ok(Some(AuthenticatedUser {
            id: "user-7".to_string(),
        })));
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());

        let key = resolve_client_key(&headers, &resolver);
        assert_eq!(key.as_str(), "user:user-7");
    }

    #[test]
    fn test_forwarded_for_first_entry_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            " 203.0.113.9 , 10.0.0.1, 172.16.0.1".parse().unwrap(),
        );
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());

        let key = resolve_client_key(&headers, &no_user());
        assert_eq!(key.as_str(), "ip:203.0.113.9");
    }

    #[test]
    fn test_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());

        let key = resolve_client_key(&headers, &no_user());
        assert_eq!(key.as_str(), "ip:198.51.100.2");
    }

    #[test]
    fn test_no_headers_is_anonymous() {
        let headers = HeaderMap::new();

        let key = resolve_client_key(&headers, &no_user());
        assert_eq!(key.as_str(), "ip:anonymous");
    }

    #[test]
    fn test_resolver_error_falls_back_to_ip() {
        let resolver = StubResolver(Err("backend unavailable"));
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());

        let key = resolve_client_key(&headers, &resolver);
        assert_eq!(key.as_str(), "ip:203.0.113.9");
    }

    #[test]
    fn test_empty_forwarded_for_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "  ".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());

        let key = resolve_client_key(&headers, &no_user());
        assert_eq!(key.as_str(), "ip:198.51.100.2");
    }
}
