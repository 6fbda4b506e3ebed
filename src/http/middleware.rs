//! Axum middleware enforcing a [`RateLimiter`] on every request.
//!
//! Allowed and denied responses both carry `X-RateLimit-Limit`,
//! `X-RateLimit-Remaining` and `X-RateLimit-Reset`. Denied requests get a
//! `429` with `Retry-After` and never reach the inner handler. A counter
//! store failure is a `500`, never a `429`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, error};

use crate::config::KeyConfig;
use crate::ratelimit::{Decision, RateLimiter};

/// Maximum requests per window.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Requests left in the current window.
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Epoch second at which the window resets.
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Shared state of the rate limit middleware.
#[derive(Clone, Debug)]
pub struct RateLimitState {
    limiter: Arc<RateLimiter>,
    key: KeyConfig,
}

impl RateLimitState {
    /// Create middleware state from a limiter and a key recipe.
    pub fn new(limiter: Arc<RateLimiter>, key: KeyConfig) -> Self {
        Self { limiter, key }
    }

    /// The limiter requests are counted against.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Derive the caller key of `request`.
    ///
    /// The client IP (when enabled) followed by `:value:` for every
    /// configured header, with header values lowercased. Missing headers
    /// contribute `::`.
    pub fn request_key(&self, request: &Request) -> String {
        let mut key = String::new();

        if self.key.use_ip {
            key.push_str(&client_ip(request));
        }

        for name in &self.key.headers {
            let value = request
                .headers()
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            key.push(':');
            key.push_str(&value.to_lowercase());
            key.push(':');
        }

        key
    }
}

/// Rate limit middleware, for use with `axum::middleware::from_fn_with_state`.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let key = state.request_key(&request);

    let decision = match state.limiter.evaluate(&key).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(key = %key, error = %e, "Rate limit check failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error.").into_response();
        }
    };

    if !decision.is_allowed() {
        debug!(key = %key, retry_after = decision.retry_after(), "Rejecting request");

        let body = json!({
            "error": "rate_limit_exceeded",
            "message": "Too many requests.",
            "retry_after": decision.retry_after(),
        });
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        apply_headers(headers, &decision);
        headers.insert(RETRY_AFTER, HeaderValue::from(decision.retry_after()));
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit()));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining()));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at()));
}

/// Best guess at the address of the client that sent `request`.
fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get(X_FORWARDED_FOR) {
        if let Ok(forwarded) = forwarded.to_str() {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = request.headers().get(X_REAL_IP) {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}
