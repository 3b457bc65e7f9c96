//! The rate limiter facade.

use std::sync::Arc;

use tracing::{debug, trace};

use super::bucket::ConsumptionProbe;
use super::cache::{BucketHandle, LocalBucketCache};
use super::key::BucketKey;
use super::policy::BucketPolicy;
use crate::error::{BucketeerError, Result};
use crate::store::BucketStore;

/// The single entry point callers use to spend quota.
///
/// One `RateLimiter` stands for one service instance. Any number of them,
/// in this process or others, may share a store; the store's row locks are
/// what keep their decisions consistent.
pub struct RateLimiter {
    /// Authoritative per-key state, possibly shared with other instances
    store: Arc<dyn BucketStore>,
    /// Policy new handles are resolved from
    policy: BucketPolicy,
    /// Handles resolved by this instance
    cache: LocalBucketCache,
    /// Identifies this instance in logs
    instance_id: String,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("instance_id", &self.instance_id)
            .field("policy", &self.policy)
            .field("handles", &self.cache.len())
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter over `store` with the given policy.
    pub fn new(store: Arc<dyn BucketStore>, policy: BucketPolicy) -> Self {
        Self {
            store,
            policy,
            cache: LocalBucketCache::new(),
            instance_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Replace the generated instance id used in logs.
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// Try to take one token for `key`.
    ///
    /// `Ok(false)` means the quota is exhausted. An `Err` means no decision
    /// was made and says nothing about the quota.
    pub async fn try_consume(&self, key: &str) -> Result<bool> {
        self.try_consume_amount(key, 1).await
    }

    /// Try to take `amount` tokens for `key`, all or nothing.
    pub async fn try_consume_amount(&self, key: &str, amount: u64) -> Result<bool> {
        Ok(self.try_consume_and_probe(key, amount).await?.consumed)
    }

    /// Try to take `amount` tokens and report what is left and how long a
    /// rejected caller should wait.
    pub async fn try_consume_and_probe(&self, key: &str, amount: u64) -> Result<ConsumptionProbe> {
        if amount == 0 {
            return Err(BucketeerError::InvalidAmount);
        }
        let handle = self.handle(key)?;

        trace!(
            instance = %self.instance_id,
            key = %handle.key,
            amount = amount,
            "Checking bucket"
        );

        let probe = self
            .store
            .try_consume(&handle.key, &handle.configuration, amount)
            .await?;

        if !probe.consumed {
            debug!(
                instance = %self.instance_id,
                key = %handle.key,
                remaining = probe.remaining_tokens,
                retry_after = ?probe.retry_after(),
                "Bucket exhausted"
            );
        }

        Ok(probe)
    }

    /// Tokens `key` could take right now. Nothing is consumed.
    pub async fn available_tokens(&self, key: &str) -> Result<u64> {
        let handle = self.handle(key)?;
        Ok(self
            .store
            .available_tokens(&handle.key, &handle.configuration)
            .await?)
    }

    /// Number of keys this instance has resolved.
    pub fn handle_count(&self) -> usize {
        self.cache.len()
    }

    /// The id this instance logs under.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The policy buckets are created with.
    pub fn policy(&self) -> &BucketPolicy {
        &self.policy
    }

    fn handle(&self, key: &str) -> Result<Arc<BucketHandle>> {
        let key = BucketKey::new(key)?;
        Ok(self.cache.resolve(&key, &self.policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::BucketConfiguration;
    use crate::store::MemoryStore;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn limiter_at(clock: &ManualClock) -> (Arc<MemoryStore>, RateLimiter) {
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let limiter = RateLimiter::new(store.clone(), BucketPolicy::default());
        (store, limiter)
    }

    #[tokio::test]
    async fn test_empty_key_never_reaches_store() {
        let clock = ManualClock::new(0);
        let (store, limiter) = limiter_at(&clock);

        let err = assert_err!(limiter.try_consume("").await);
        assert!(matches!(err, BucketeerError::InvalidKey(_)));
        assert_eq!(store.row_count(), 0);
        assert_eq!(limiter.handle_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let clock = ManualClock::new(0);
        let (_store, limiter) = limiter_at(&clock);

        let err = assert_err!(limiter.try_consume_amount("k", 0).await);
        assert!(matches!(err, BucketeerError::InvalidAmount));
    }

    #[tokio::test]
    async fn test_three_per_five_seconds_scenario() {
        let clock = ManualClock::new(0);
        let (_store, limiter) = limiter_at(&clock);

        let mut results = Vec::new();
        for _ in 0..4 {
            results.push(assert_ok!(limiter.try_consume("k").await));
        }
        assert_eq!(results, vec![true, true, true, false]);

        clock.advance(Duration::from_millis(5100));
        assert!(assert_ok!(limiter.try_consume("k").await));
        assert_eq!(assert_ok!(limiter.available_tokens("k").await), 2);
    }

    #[tokio::test]
    async fn test_exactly_capacity_accepted_without_elapsed_time() {
        let clock = ManualClock::new(0);
        let (_store, limiter) = limiter_at(&clock);

        let mut accepted = 0;
        for _ in 0..10 {
            if assert_ok!(limiter.try_consume("burst").await) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 3);
    }

    #[tokio::test]
    async fn test_waiting_k_periods_restores_k_batches() {
        let clock = ManualClock::new(0);
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let config = BucketConfiguration::new(10, 2, Duration::from_secs(1)).unwrap();
        let limiter = RateLimiter::new(store, BucketPolicy::new(config));

        assert!(assert_ok!(limiter.try_consume_amount("k", 10).await));
        assert_eq!(assert_ok!(limiter.available_tokens("k").await), 0);

        clock.advance(Duration::from_secs(3));
        assert_eq!(assert_ok!(limiter.available_tokens("k").await), 6);

        clock.advance(Duration::from_secs(30));
        assert_eq!(assert_ok!(limiter.available_tokens("k").await), 10);
    }

    #[tokio::test]
    async fn test_idle_full_bucket_stays_at_capacity() {
        let clock = ManualClock::new(0);
        let (_store, limiter) = limiter_at(&clock);

        assert_eq!(assert_ok!(limiter.available_tokens("fresh").await), 3);
        clock.advance(Duration::from_secs(5));
        assert_eq!(assert_ok!(limiter.available_tokens("fresh").await), 3);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_interfere() {
        let clock = ManualClock::new(0);
        let (_store, limiter) = limiter_at(&clock);

        for _ in 0..3 {
            assert!(assert_ok!(limiter.try_consume("A").await));
        }
        assert!(!assert_ok!(limiter.try_consume("A").await));
        assert!(assert_ok!(limiter.try_consume("B").await));
        assert_eq!(limiter.handle_count(), 2);
    }

    #[tokio::test]
    async fn test_probe_reports_retry_after() {
        let clock = ManualClock::new(0);
        let (_store, limiter) = limiter_at(&clock);

        assert_ok!(limiter.try_consume_amount("k", 3).await);
        clock.advance(Duration::from_secs(2));

        let probe = assert_ok!(limiter.try_consume_and_probe("k", 1).await);
        assert!(!probe.consumed);
        assert_eq!(probe.retry_after(), Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_a_rejection() {
        let clock = ManualClock::new(0);
        let (store, limiter) = limiter_at(&clock);

        store.set_available(false);
        let err = assert_err!(limiter.try_consume("k").await);
        assert!(matches!(err, BucketeerError::StoreUnavailable(_)));
        assert!(err.is_transient());
    }
}
