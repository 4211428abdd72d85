//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::LimiterConfig;
use crate::error::Result;

use super::backend::{BucketStore, RefillRequest, StoreError};
use super::decision::Decision;
use super::fallback::LocalFallback;
use super::key::BucketKey;

/// A rate limiter for one route.
///
/// Decisions come from the shared bucket store when it answers in time.
/// Otherwise the limiter falls back to its own in-process buckets and, once
/// those run dry, to the configured fail mode. This struct is thread-safe
/// and can be shared across multiple tasks.
pub struct RateLimiter {
    config: LimiterConfig,
    /// Shared bucket state
    store: Arc<dyn BucketStore>,
    /// Buckets used while the store is unavailable
    fallback: LocalFallback,
    clock: Arc<dyn Clock>,
    remote_timeout: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("fallback_buckets", &self.fallback.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl RateLimiter {
    /// Create a new rate limiter using the system clock.
    pub fn new(config: LimiterConfig, store: Arc<dyn BucketStore>) -> Result<Self> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Create a new rate limiter with an explicit clock.
    pub fn with_clock(
        config: LimiterConfig,
        store: Arc<dyn BucketStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        debug!(
            route = %config.route_name,
            max_tokens = config.max_tokens,
            refill_window_secs = config.refill_window_secs,
            fail_mode = %config.fail_mode,
            "Creating rate limiter"
        );

        Ok(Self {
            fallback: LocalFallback::new(config.max_tokens, config.refill_window_secs),
            remote_timeout: config.remote_timeout(),
            config,
            store,
            clock,
        })
    }

    /// Check the rate limit for an identity, consuming a token if one is available.
    ///
    /// Never fails: store errors and timeouts are logged and answered from
    /// the local fallback.
    pub async fn check(&self, identity: &str) -> Decision {
        let now = self.clock.now_secs();
        let key = BucketKey::new(&self.config.route_name, identity);
        let request = RefillRequest::new(
            &key,
            self.config.max_tokens,
            self.config.refill_window_secs,
            now,
        );

        trace!(
            key = %key,
            now = now,
            "Checking rate limit"
        );

        let result = match tokio::time::timeout(self.remote_timeout, self.store.refill_consume(&request)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.remote_timeout)),
        };

        match result {
            Ok(outcome) => {
                let decision = Decision::remote(outcome);
                if !decision.allowed {
                    debug!(key = %key, "Rate limit exceeded");
                }
                decision
            }
            Err(error) => {
                warn!(
                    route = %self.config.route_name,
                    error = %error,
                    "Bucket store unavailable, using local fallback"
                );
                self.check_fallback(&key, now)
            }
        }
    }

    /// Answer from the local fallback bucket, then the fail mode.
    fn check_fallback(&self, key: &BucketKey, now: i64) -> Decision {
        match self.fallback.try_consume(&key.identity, now) {
            Some(remaining) => Decision::local(remaining),
            None => {
                let decision = self.config.fail_mode.decide();
                debug!(
                    key = %key,
                    fail_mode = %self.config.fail_mode,
                    allowed = decision.allowed,
                    "Local fallback exhausted"
                );
                decision
            }
        }
    }

    /// Get the limiter configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Get the route this limiter guards.
    pub fn route_name(&self) -> &str {
        &self.config.route_name
    }

    /// Get the number of local fallback buckets created so far.
    pub fn fallback_bucket_count(&self) -> usize {
        self.fallback.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::{DecisionSource, FailMode, RefillOutcome};
    use crate::store::MemoryBucketStore;
    use async_trait::async_trait;

    const NOW: i64 = 1_700_000_000;

    struct StallingStore;

    #[async_trait]
    impl BucketStore for StallingStore {
        async fn refill_consume(&self, _request: &RefillRequest) -> std::result::Result<RefillOutcome, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(RefillOutcome {
                allowed: true,
                remaining: 99,
            })
        }
    }

    fn create_limiter(
        config: LimiterConfig,
    ) -> (RateLimiter, Arc<MemoryBucketStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryBucketStore::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let limiter = RateLimiter::with_clock(config, store.clone(), clock.clone()).unwrap();
        (limiter, store, clock)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let store = Arc::new(MemoryBucketStore::new());
        assert!(RateLimiter::new(LimiterConfig::new("api", 0, 60), store.clone()).is_err());
        assert!(RateLimiter::new(LimiterConfig::new("api", 10, 0), store).is_err());
    }

    #[tokio::test]
    async fn test_remote_decisions() {
        let (limiter, _store, _clock) = create_limiter(LimiterConfig::new("api", 3, 60));

        for expected in [2, 1, 0] {
            let decision = limiter.check("client").await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
            assert_eq!(decision.source, DecisionSource::Remote);
        }

        let decision = limiter.check("client").await;
        assert!(!decision.allowed);
        assert_eq!(decision.source, DecisionSource::Remote);
        assert_eq!(limiter.fallback_bucket_count(), 0);
    }

    #[tokio::test]
    async fn test_refill_after_window() {
        let (limiter, _store, clock) = create_limiter(LimiterConfig::new("api", 2, 30));

        limiter.check("client").await;
        limiter.check("client").await;
        assert!(!limiter.check("client").await.allowed);

        clock.advance(30);
        let decision = limiter.check("client").await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn test_remote_overrides_fail_mode() {
        let (limiter, _store, _clock) =
            create_limiter(LimiterConfig::new("api", 1, 60).with_fail_mode(FailMode::Open));

        limiter.check("client").await;
        let decision = limiter.check("client").await;
        assert!(!decision.allowed);
        assert_eq!(decision.source, DecisionSource::Remote);
    }

    #[tokio::test]
    async fn test_store_failure_uses_fallback() {
        let (limiter, store, _clock) =
            create_limiter(LimiterConfig::new("api", 2, 60).with_fail_mode(FailMode::Closed));
        store.set_available(false);

        assert_eq!(limiter.check("client").await, Decision::local(1));
        assert_eq!(limiter.check("client").await, Decision::local(0));
        assert_eq!(limiter.check("client").await, FailMode::Closed.decide());
        assert_eq!(limiter.fallback_bucket_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_is_separate_from_store() {
        let (limiter, store, _clock) = create_limiter(LimiterConfig::new("api", 2, 60));

        // Exhaust the shared bucket, then lose the store: the local
        // bucket starts full regardless.
        limiter.check("client").await;
        limiter.check("client").await;
        store.set_available(false);
        assert_eq!(limiter.check("client").await, Decision::local(1));

        // Store back: its own state decides again.
        store.set_available(true);
        let decision = limiter.check("client").await;
        assert!(!decision.allowed);
        assert_eq!(decision.source, DecisionSource::Remote);
    }

    #[tokio::test]
    async fn test_fallback_resets_after_window() {
        let (limiter, store, clock) =
            create_limiter(LimiterConfig::new("api", 1, 30).with_fail_mode(FailMode::Closed));
        store.set_available(false);

        assert!(limiter.check("client").await.allowed);
        assert!(!limiter.check("client").await.allowed);

        clock.advance(30);
        assert_eq!(limiter.check("client").await, Decision::local(0));
    }

    #[tokio::test]
    async fn test_timeout_uses_fallback() {
        let config = LimiterConfig::new("api", 5, 60).with_remote_timeout_ms(20);
        let limiter = RateLimiter::new(config, Arc::new(StallingStore)).unwrap();

        let started = std::time::Instant::now();
        let decision = limiter.check("client").await;

        assert_eq!(decision, Decision::local(4));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
