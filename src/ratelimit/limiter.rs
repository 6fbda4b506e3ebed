//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::backend::CounterBackend;
use super::decision::Decision;
use super::key::BackendKey;
use super::window::{self, Clock, SystemClock, Window};
use crate::error::{BackendError, ConfigurationError};

/// The limits a [`RateLimiter`] applies when a call does not override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    prefix: String,
    limit: u64,
    window: Window,
}

impl Policy {
    /// Create a policy.
    pub fn new(prefix: impl Into<String>, limit: u64, window: Window) -> Self {
        Self {
            prefix: prefix.into(),
            limit,
            window,
        }
    }

    /// Namespace prepended to every backend key. May be empty.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Requests allowed per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length.
    pub fn window(&self) -> Window {
        self.window
    }
}

/// Fixed-window rate limiter.
///
/// Holds no per-call state; every count lives in the counter store, so a
/// single instance can be shared across any number of tasks.
pub struct RateLimiter {
    policy: Policy,
    backend: Arc<dyn CounterBackend>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter allowing `limit` requests per `window` for each key.
    ///
    /// Fails if `window` is not a positive whole number of seconds.
    pub fn new(
        prefix: impl Into<String>,
        backend: Arc<dyn CounterBackend>,
        limit: u64,
        window: Duration,
    ) -> Result<Self, ConfigurationError> {
        let window = Window::try_from(window)?;
        Ok(Self::from_policy(Policy::new(prefix, limit, window), backend))
    }

    /// Create a limiter from an already validated policy.
    pub fn from_policy(policy: Policy, backend: Arc<dyn CounterBackend>) -> Self {
        debug!(
            prefix = %policy.prefix,
            limit = policy.limit,
            window = %policy.window,
            "Creating rate limiter"
        );
        Self {
            policy,
            backend,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get the default policy.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Count one request for `key` against the default limit and window.
    pub async fn evaluate(&self, key: &str) -> Result<Decision, BackendError> {
        self.evaluate_with_override(key, self.policy.limit, self.policy.window)
            .await
    }

    /// Count one request for `key` against `limit` requests per `window`.
    ///
    /// Counters are keyed by window, so calls with different windows for the
    /// same key are tracked separately.
    pub async fn evaluate_with_override(
        &self,
        key: &str,
        limit: u64,
        window: Window,
    ) -> Result<Decision, BackendError> {
        let now = self.clock.now();
        let (retry_after, reset_at) = window::next_reset(now, window);
        let backend_key = BackendKey::new(
            &self.policy.prefix,
            &window::bucket_id(now, window),
            key,
        );
        let ttl = window::ttl_hint(retry_after);

        trace!(
            key = %backend_key,
            limit = limit,
            window = %window,
            ttl = ttl,
            "Checking rate limit"
        );

        let current = self
            .backend
            .increment(backend_key.as_str(), ttl)
            .await
            .map_err(|e| {
                warn!(key = %backend_key, error = %e, "Counter store failed");
                e
            })?;

        let decision = Decision::from_count(current, limit, reset_at, retry_after);
        if !decision.is_allowed() {
            debug!(
                key = %backend_key,
                count = current,
                limit = limit,
                retry_after = retry_after,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::window::ManualClock;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;

    // Wed Dec 18 11:55:36 UTC 2019
    const NOW: i64 = 1_576_670_136;

    /// Records every call and answers from a running total.
    #[derive(Default)]
    struct RecordingBackend {
        count: Mutex<u64>,
        calls: Mutex<Vec<(String, u64)>>,
    }

    impl RecordingBackend {
        fn starting_at(count: u64) -> Self {
            Self {
                count: Mutex::new(count),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CounterBackend for RecordingBackend {
        async fn increment(&self, key: &str, ttl_secs: u64) -> Result<u64, BackendError> {
            self.calls.lock().push((key.to_string(), ttl_secs));
            let mut count = self.count.lock();
            *count += 1;
            Ok(*count)
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl CounterBackend for FailingBackend {
        async fn increment(&self, _key: &str, _ttl_secs: u64) -> Result<u64, BackendError> {
            Err(BackendError::Unavailable("connection refused".to_string()))
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.timestamp_opt(NOW, 0).unwrap()))
    }

    fn limiter(prefix: &str, backend: Arc<dyn CounterBackend>, limit: u64) -> RateLimiter {
        RateLimiter::from_policy(Policy::new(prefix, limit, Window::HOUR), backend)
            .with_clock(clock())
    }

    #[test]
    fn test_rejects_invalid_window() {
        let backend: Arc<dyn CounterBackend> = Arc::new(RecordingBackend::default());
        let err = RateLimiter::new("p", backend.clone(), 10, Duration::ZERO).unwrap_err();
        assert_eq!(err, ConfigurationError::InvalidWindow(Duration::ZERO));

        assert!(RateLimiter::new("p", backend, 10, Duration::from_millis(250)).is_err());
    }

    #[test]
    fn test_policy_defaults() {
        let backend = Arc::new(RecordingBackend::default());
        let limiter = RateLimiter::new("MyPrefix", backend, 1, Duration::from_secs(1)).unwrap();
        assert_eq!(limiter.policy(), &Policy::new("MyPrefix", 1, Window::SECOND));
    }

    #[tokio::test]
    async fn test_under_limit() {
        let limiter = limiter("", Arc::new(RecordingBackend::default()), 10);

        let decision = limiter.evaluate("my_key").await.unwrap();

        assert!(decision.is_allowed());
        assert_eq!(decision.current(), 1);
        assert_eq!(decision.limit(), 10);
        assert_eq!(decision.remaining(), 9);
        assert_eq!(decision.reset_at(), 1_576_670_400);
        assert_eq!(decision.retry_after(), 264);
    }

    #[tokio::test]
    async fn test_near_limit() {
        let limiter = limiter("", Arc::new(RecordingBackend::starting_at(9)), 10);

        let decision = limiter.evaluate("my_key").await.unwrap();

        assert!(decision.is_allowed());
        assert_eq!(decision.current(), 10);
        assert_eq!(decision.remaining(), 0);
    }

    #[tokio::test]
    async fn test_limit_reached() {
        let limiter = limiter("", Arc::new(RecordingBackend::starting_at(10)), 10);

        let decision = limiter.evaluate("my_key").await.unwrap();

        assert!(!decision.is_allowed());
        assert_eq!(decision.current(), 11);
        assert_eq!(decision.remaining(), 0);
        assert_eq!(decision.retry_after(), 264);
    }

    #[tokio::test]
    async fn test_backend_error_is_propagated() {
        let limiter = limiter("", Arc::new(FailingBackend), 10);

        let err = tokio_test::assert_err!(limiter.evaluate("my_key").await);

        assert!(matches!(err, BackendError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_builds_key_and_ttl() {
        let backend = Arc::new(RecordingBackend::default());
        let limiter = limiter("p", backend.clone(), 10);

        limiter.evaluate("k1").await.unwrap();
        limiter
            .evaluate_with_override("k1", 5, Window::MINUTE)
            .await
            .unwrap();

        let calls = backend.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                ("p_1218_110000_k1".to_string(), 264 + 5),
                ("p_1218_115500_k1".to_string(), 24 + 5),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_prefix_is_omitted() {
        let backend = Arc::new(RecordingBackend::default());
        let limiter = limiter("", backend.clone(), 10);

        limiter.evaluate("k1").await.unwrap();

        assert_eq!(backend.calls.lock()[0].0, "1218_110000_k1");
    }

    #[tokio::test]
    async fn test_override_limit() {
        let limiter = limiter("p", Arc::new(MemoryStore::new(16).unwrap()), 1000);

        for i in 1..=5 {
            let decision = limiter
                .evaluate_with_override("k", 5, Window::SECOND)
                .await
                .unwrap();
            assert!(decision.is_allowed(), "Request {} should be allowed", i);
            assert_eq!(decision.limit(), 5);
        }

        let decision = limiter
            .evaluate_with_override("k", 5, Window::SECOND)
            .await
            .unwrap();
        assert!(!decision.is_allowed());
        assert_eq!(decision.retry_after(), 1);
    }

    #[tokio::test]
    async fn test_exhausts_limit_then_denies() {
        let limiter = limiter("p", Arc::new(MemoryStore::new(4).unwrap()), 10);

        for expected_remaining in (0..10).rev() {
            let decision = limiter.evaluate("k1").await.unwrap();
            assert!(decision.is_allowed());
            assert_eq!(decision.remaining(), expected_remaining);
        }

        let other = limiter.evaluate("k2").await.unwrap();
        assert!(other.is_allowed());
        assert_eq!(other.remaining(), 9);

        let denied = limiter.evaluate("k1").await.unwrap();
        assert!(!denied.is_allowed());
        assert_eq!(denied.remaining(), 0);
        assert_eq!(denied.current(), 11);
        assert!(denied.retry_after() > 0);
    }

    #[tokio::test]
    async fn test_current_increments_by_one() {
        let limiter = limiter("p", Arc::new(MemoryStore::new(4).unwrap()), 3);

        let mut previous = 0;
        for _ in 0..6 {
            let decision = limiter.evaluate("k").await.unwrap();
            assert_eq!(decision.current(), previous + 1);
            previous = decision.current();
        }
    }

    #[tokio::test]
    async fn test_new_window_starts_new_counter() {
        let clock = clock();
        let limiter = RateLimiter::from_policy(
            Policy::new("p", 2, Window::HOUR),
            Arc::new(MemoryStore::new(16).unwrap()),
        )
        .with_clock(clock.clone());

        limiter.evaluate("k").await.unwrap();
        limiter.evaluate("k").await.unwrap();
        assert!(!limiter.evaluate("k").await.unwrap().is_allowed());

        clock.advance(Duration::from_secs(264));

        let decision = limiter.evaluate("k").await.unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.current(), 1);
        assert_eq!(decision.retry_after(), 3600);
        assert_eq!(decision.reset_at(), 1_576_674_000);
    }

    #[tokio::test]
    async fn test_reset_matches_observation_instant() {
        let clock = clock();
        let limiter = RateLimiter::from_policy(
            Policy::new("p", 100, Window::from_secs(90).unwrap()),
            Arc::new(MemoryStore::new(64).unwrap()),
        )
        .with_clock(clock.clone());

        for _ in 0..20 {
            let decision = limiter.evaluate("k").await.unwrap();
            assert!(decision.retry_after() > 0);
            assert_eq!(
                decision.reset_at() - decision.retry_after() as i64,
                clock.now().timestamp()
            );
            clock.advance(Duration::from_secs(7));
        }
    }

    #[tokio::test]
    async fn test_concurrent_evaluations_share_one_counter() {
        let limiter = Arc::new(limiter("p", Arc::new(MemoryStore::new(16).unwrap()), 25));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.evaluate("shared").await.unwrap() })
            })
            .collect();

        let decisions = futures::future::join_all(handles).await;
        let mut counts: Vec<u64> = decisions
            .iter()
            .map(|d| d.as_ref().unwrap().current())
            .collect();
        counts.sort_unstable();

        assert_eq!(counts, (1..=100).collect::<Vec<_>>());
        let allowed = decisions
            .iter()
            .filter(|d| d.as_ref().unwrap().is_allowed())
            .count();
        assert_eq!(allowed, 25);
    }
}
