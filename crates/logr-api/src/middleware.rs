//! Request middleware: keyed rate limiting, request-size limit, and
//! metrics recording.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use logr_core::{defaults, Error};

use crate::auth::bearer_token;
use crate::error::ApiError;
use crate::AppState;

/// Per-key rate limiter. Process-local by design; multi-process
/// deployments need an external limiter.
pub type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Build the keyed limiter for `per_minute` requests per key.
pub fn build_limiter(per_minute: u32) -> KeyedLimiter {
    let quota = Quota::per_minute(NonZeroU32::new(per_minute.max(1)).unwrap_or(NonZeroU32::MIN));
    RateLimiter::keyed(quota)
}

/// Paths exempt from rate limiting (health checks and introspection).
pub fn bypasses_rate_limit(path: &str) -> bool {
    matches!(path, "/" | "/health" | "/metrics" | "/metrics/prometheus" | "/docs")
}

/// Rate-limit key: the first 13 characters of the bearer token, else
/// the client address, else a shared bucket.
pub fn rate_limit_key(auth_header: Option<&str>, client: Option<SocketAddr>) -> String {
    if let Some(token) = bearer_token(auth_header) {
        return token
            .chars()
            .take(defaults::RATE_LIMIT_KEY_PREFIX)
            .collect();
    }
    match client {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

/// Keyed rate limiting. On exceed: 429 with `Retry-After` set to the
/// seconds until the key's window admits another request.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if bypasses_rate_limit(req.uri().path()) {
        return next.run(req).await;
    }

    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let key = rate_limit_key(auth_header, client);

    match state.limiter.check_key(&key) {
        Ok(_) => next.run(req).await,
        Err(not_until) => {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            let retry_secs = wait.as_secs().max(1);
            ApiError::from(Error::RateLimited(retry_secs)).into_response()
        }
    }
}

/// Reject requests whose declared Content-Length exceeds the limit
/// with 413 before any body is read.
pub async fn request_size_limit(req: Request, next: Next) -> Response {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if let Some(length) = declared {
        if length > defaults::MAX_BODY_SIZE_BYTES {
            let detail = format!(
                "Request body too large. Maximum size: {}MB",
                defaults::MAX_BODY_SIZE_BYTES / (1024 * 1024)
            );
            return (
                axum::http::StatusCode::PAYLOAD_TOO_LARGE,
                axum::Json(serde_json::json!({ "detail": detail })),
            )
                .into_response();
        }
    }

    next.run(req).await
}

/// Record request count, status, and latency. Recording is infallible
/// by construction and never touches the response.
pub async fn track_metrics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let response = next.run(req).await;
    state
        .metrics
        .record(response.status().as_u16(), start.elapsed());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bypass_paths() {
        assert!(bypasses_rate_limit("/health"));
        assert!(bypasses_rate_limit("/"));
        assert!(bypasses_rate_limit("/metrics"));
        assert!(bypasses_rate_limit("/metrics/prometheus"));
        assert!(!bypasses_rate_limit("/v1/logs"));
        assert!(!bypasses_rate_limit("/v1/search/semantic"));
    }

    #[test]
    fn test_rate_limit_key_uses_token_prefix() {
        let key = rate_limit_key(Some("Bearer logr_abcdefghijklmnop"), None);
        assert_eq!(key, "logr_abcdefgh");
        assert_eq!(key.len(), 13);
    }

    #[test]
    fn test_rate_limit_key_falls_back_to_client() {
        let addr: SocketAddr = "10.0.0.7:5544".parse().unwrap();
        assert_eq!(rate_limit_key(None, Some(addr)), "10.0.0.7");
        assert_eq!(rate_limit_key(Some("Basic zzz"), Some(addr)), "10.0.0.7");
    }

    #[test]
    fn test_rate_limit_key_unknown() {
        assert_eq!(rate_limit_key(None, None), "unknown");
    }

    #[test]
    fn test_limiter_blocks_after_quota() {
        let limiter = build_limiter(2);
        let key = "logr_test".to_string();
        assert!(limiter.check_key(&key).is_ok());
        assert!(limiter.check_key(&key).is_ok());
        assert!(limiter.check_key(&key).is_err());
        // A different key has its own budget.
        assert!(limiter.check_key(&"other".to_string()).is_ok());
    }
}
