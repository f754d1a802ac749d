// =============================================================================
// Bearer Token Authentication — Axum Extractor
// =============================================================================
//
// Guards the endpoints that trigger work (manual scans). The expected token
// is the `PUSH_TOKEN` environment variable, captured into `AppState` at
// startup. Comparison is constant-time.
//
//   async fn handler(_auth: AuthBearer, ...) { ... }
//
// A missing, malformed or wrong token short-circuits with 403 before the
// handler runs. With no token configured every guarded request is rejected.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::app_state::AppState;

// =============================================================================
// Constant-time comparison
// =============================================================================

/// Compare two byte slices in constant time with respect to their contents.
/// A length mismatch returns early; token length is not secret here.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// =============================================================================
// Extractor
// =============================================================================

/// Validated `Authorization: Bearer <PUSH_TOKEN>` header.
pub struct AuthBearer;

/// Rejection type returned when authentication fails.
#[derive(Debug)]
pub struct AuthRejection {
    status: StatusCode,
    message: &'static str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, axum::Json(body)).into_response()
    }
}

/// Check an `Authorization` header value against the configured token.
pub fn check_bearer(header: Option<&str>, expected: Option<&str>) -> Result<(), AuthRejection> {
    let Some(expected) = expected.filter(|t| !t.is_empty()) else {
        warn!("PUSH_TOKEN is not set; rejecting authenticated request");
        return Err(AuthRejection {
            status: StatusCode::FORBIDDEN,
            message: "Server authentication not configured",
        });
    };

    let Some(token) = header.and_then(|v| v.strip_prefix("Bearer ")) else {
        warn!("missing or malformed Authorization header");
        return Err(AuthRejection {
            status: StatusCode::FORBIDDEN,
            message: "Missing or invalid authorization token",
        });
    };

    if !constant_time_eq(token.trim().as_bytes(), expected.as_bytes()) {
        warn!("invalid push token presented");
        return Err(AuthRejection {
            status: StatusCode::FORBIDDEN,
            message: "Invalid authorization token",
        });
    }

    Ok(())
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthBearer {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        check_bearer(header, state.push_token.as_deref())?;
        Ok(AuthBearer)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_identical() {
        assert!(constant_time_eq(b"hello", b"hello"));
    }

    #[test]
    fn constant_time_eq_different() {
        assert!(!constant_time_eq(b"hello", b"world"));
    }

    #[test]
    fn constant_time_eq_different_lengths() {
        assert!(!constant_time_eq(b"short", b"longer_string"));
    }

    #[test]
    fn constant_time_eq_single_bit_diff() {
        assert!(!constant_time_eq(b"\x00", b"\x01"));
    }

    #[test]
    fn bearer_accepted() {
        assert!(check_bearer(Some("Bearer s3cret"), Some("s3cret")).is_ok());
    }

    #[test]
    fn bearer_rejections() {
        let status = |r: Result<(), AuthRejection>| r.unwrap_err().status;
        assert_eq!(status(check_bearer(Some("Bearer s3cret"), None)), StatusCode::FORBIDDEN);
        assert_eq!(status(check_bearer(Some("Bearer s3cret"), Some(""))), StatusCode::FORBIDDEN);
        assert_eq!(status(check_bearer(None, Some("s3cret"))), StatusCode::FORBIDDEN);
        assert_eq!(status(check_bearer(Some("s3cret"), Some("s3cret"))), StatusCode::FORBIDDEN);
        assert_eq!(status(check_bearer(Some("Bearer nope"), Some("s3cret"))), StatusCode::FORBIDDEN);
    }
}
