//! Session resolution module for Weathervane
//!
//! This module answers one question for the rate limiter: "which user, if
//! any, is behind this request?" The answer feeds the client key used for
//! rate limiting, nothing more. Weathervane does not gate any route on
//! authentication; an unresolvable session simply means the caller is rate
//! limited by IP address instead of user id.
//!
//! # Supported Features
//!
//! - **`SessionResolver` trait**: pluggable session backend, object-safe so
//!   the server can inject it as `Arc<dyn SessionResolver>`
//! - **`JwtSessionResolver`**: default backend decoding an HS256 session
//!   token from the `Authorization: Bearer` header
//!
//! Resolver errors are surfaced as `Result` so callers can log them, but the
//! rate-limit path always degrades to "no user" rather than rejecting the
//! request.

use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::debug;

///////////////////////////////////////////////////////////////////////////////
//****                         Public Structs                            ****//
///////////////////////////////////////////////////////////////////////////////

/// A user resolved from the request's session credentials
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub id: String,
}

/// Errors produced by a session backend
pub type AuthError = Box<dyn std::error::Error + Send + Sync>;

/// Pluggable session backend
///
/// `Ok(None)` means "no session present", `Err` means "the backend failed to
/// decide". Callers on the rate-limit path treat both the same way.
pub trait SessionResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Result<Option<AuthenticatedUser>, AuthError>;
}

/// Session claims carried in the HS256 token
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String, // Subject (user identifier)
    exp: usize,  // Expiration time (as UTC timestamp)
}

/// Default session backend: HS256 JWT in the `Authorization: Bearer` header
#[derive(Debug, Clone)]
pub struct JwtSessionResolver {
    secret: Option<String>,
}

///////////////////////////////////////////////////////////////////////////////
//****                       Public Functions                            ****//
///////////////////////////////////////////////////////////////////////////////

impl JwtSessionResolver {
    /// Create a resolver. With no secret configured every request resolves
    /// to `Ok(None)`.
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }
}

impl SessionResolver for JwtSessionResolver {
    fn resolve(&self, headers: &HeaderMap) -> Result<Option<AuthenticatedUser>, AuthError> {
        let Some(secret) = &self.secret else {
            return Ok(None);
        };

        let Some(auth_header) = headers.get("authorization") else {
            return Ok(None);
        };

        let auth_value = auth_header.to_str()?;
        let Some(token) = auth_value.strip_prefix("Bearer ") else {
            return Ok(None);
        };

        let validation = Validation::new(Algorithm::HS256);
        let decoding_key = DecodingKey::from_secret(secret.as_ref());
        let token_data = decode::<SessionClaims>(token, &decoding_key, &validation)?;

        debug!(
            "Session token validated for subject: {}",
            token_data.claims.sub
        );

        Ok(Some(AuthenticatedUser {
            id: token_data.claims.sub,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn make_token(secret: &str, sub: &str, exp: usize) -> String {
        let claims = SessionClaims {
            sub: sub.to_string(),
            exp,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_ref()),
        )
        .unwrap()
    }

    fn far_future() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[test]
    fn test_no_secret_resolves_to_none() {
        let resolver = JwtSessionResolver::new(None);
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer whatever".parse().unwrap());

        assert_eq!(resolver.resolve(&headers).unwrap(), None);
    }

    #[test]
    fn test_no_header_resolves_to_none() {
        let resolver = JwtSessionResolver::new(Some("test-secret".to_string()));
        let headers = HeaderMap::new();

        assert_eq!(resolver.resolve(&headers).unwrap(), None);
    }

    #[test]
    fn test_valid_token_resolves_user() {
        let resolver = JwtSessionResolver::new(Some("test-secret".to_string()));
        let token = make_token("test-secret", "user-42", far_future());
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            format!("Bearer {}", token).parse().unwrap(),
        );

        let user = resolver.resolve(&headers).unwrap();
        assert_eq!(
            user,
            Some(AuthenticatedUser {
                id: "user-42".to_string()
            })
        );
    }

    #[test]
    fn test_wrong_secret_is_an_error() {
        let resolver = JwtSessionResolver::new(Some("test-secret".to_string()));
        let token = make_token("other-secret", "user-42", far_future());
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            format!("Bearer {}", token).parse().unwrap(),
        );

        assert!(resolver.resolve(&headers).is_err());
    }

    #[test]
    fn test_non_bearer_scheme_resolves_to_none() {
        let resolver = JwtSessionResolver::new(Some("test-secret".to_string()));
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic dXNlcjpwYXNz".parse().unwrap());

        assert_eq!(resolver.resolve(&headers).unwrap(), None);
    }
}
