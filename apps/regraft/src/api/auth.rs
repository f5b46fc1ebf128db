//! # Authentication Module
//!
//! Simple API key authentication for the Regraft HTTP API.
//!
//! ## Configuration
//!
//! Authentication is configured via environment variable:
//! - `REGRAFT_API_KEY`: If set, all requests (except /health) require this key
//!
//! ## Usage
//!
//! Send the API key in the Authorization header:
//! ```text
//! Authorization: Bearer <your-api-key>
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;

// =============================================================================
// API KEY
// =============================================================================

/// The key clients must present. Never printed.
#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    #[must_use]
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    /// Compare `provided` against the key in constant time.
    ///
    /// Both sides are padded to the same length so the comparison always
    /// covers the same number of bytes.
    #[must_use]
    pub fn matches(&self, provided: &str) -> bool {
        let provided = provided.as_bytes();
        let expected = self.0.as_bytes();

        let len = provided.len().max(expected.len());
        let mut a = vec![0u8; len];
        let mut b = vec![0u8; len];
        a[..provided.len()].copy_from_slice(provided);
        b[..expected.len()].copy_from_slice(expected);

        let equal: bool = a.ct_eq(&b).into();
        equal && provided.len() == expected.len()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(..)")
    }
}

/// Get API key from environment variable.
///
/// Returns `Some(key)` if `REGRAFT_API_KEY` is set and non-empty,
/// `None` otherwise (disabling authentication).
pub fn get_api_key_from_env() -> Option<String> {
    std::env::var("REGRAFT_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

/// API key authentication middleware.
///
/// `/health` is always allowed (for load balancer checks). Every other
/// endpoint requires `Authorization: Bearer <key>`; a bare `<key>` is
/// accepted too.
pub async fn api_key_auth_middleware(
    State(key): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v));

    match provided {
        Some(provided) if key.matches(provided) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!(
                event = "auth_failure",
                reason = "invalid_api_key",
                "Authentication failed: invalid API key"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_matches_exactly() {
        let key = ApiKey::new("secret");
        assert!(key.matches("secret"));
        assert!(!key.matches("secret2"));
        assert!(!key.matches("secre"));
        assert!(!key.matches(""));
    }

    #[test]
    fn debug_hides_key() {
        let key = ApiKey::new("secret");
        assert!(!format!("{key:?}").contains("secret"));
    }
}
