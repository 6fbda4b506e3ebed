//! The outcome of one rate limit evaluation.

use serde::Serialize;

/// Result of evaluating one request against a limit.
///
/// Carries everything an adapter needs to render protocol output such as
/// `X-RateLimit-*` and `Retry-After` headers. `remaining` is zero whenever
/// the request is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    allowed: bool,
    current: u64,
    limit: u64,
    remaining: u64,
    reset_at: i64,
    retry_after: u64,
}

impl Decision {
    /// Fold a counter value into a decision.
    ///
    /// The request that brings the counter to exactly `limit` is still
    /// allowed; only the next one is denied.
    pub fn from_count(current: u64, limit: u64, reset_at: i64, retry_after: u64) -> Self {
        let allowed = current <= limit;
        Self {
            allowed,
            current,
            limit,
            remaining: if allowed { limit - current } else { 0 },
            reset_at,
            retry_after,
        }
    }

    /// Whether the request is within the limit.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Counter value after this request.
    pub fn current(&self) -> u64 {
        self.current
    }

    /// The limit the request was checked against.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Requests still allowed in the current window.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Epoch second at which the window rolls over.
    pub fn reset_at(&self) -> i64 {
        self.reset_at
    }

    /// Seconds until the window rolls over.
    pub fn retry_after(&self) -> u64 {
        self.retry_after
    }
}
