//! Bucket policy values and the intervally refill math.
//!
//! Everything in this module is pure: stores load a [`BucketState`], apply
//! [`BucketState::refill`] and [`BucketState::try_consume`] while holding
//! the row lock, then write the state back.

use std::time::Duration;

use crate::error::{BucketeerError, Result};

/// Capacity and refill policy of a token bucket.
///
/// Tokens are added in batches of `refill_amount` once every
/// `refill_period`, never beyond `capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketConfiguration {
    capacity: u64,
    refill_amount: u64,
    refill_period: Duration,
}

impl BucketConfiguration {
    /// Create a validated configuration.
    ///
    /// The refill period is stored with millisecond precision, so it must be
    /// at least one millisecond and is truncated to whole milliseconds.
    pub fn new(capacity: u64, refill_amount: u64, refill_period: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(BucketeerError::Config(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if refill_amount == 0 {
            return Err(BucketeerError::Config(
                "refill amount must be greater than zero".to_string(),
            ));
        }
        let millis = refill_period.as_millis();
        if millis == 0 {
            return Err(BucketeerError::Config(
                "refill period must be at least one millisecond".to_string(),
            ));
        }
        if millis > i64::MAX as u128 {
            return Err(BucketeerError::Config("refill period is too long".to_string()));
        }

        Ok(Self {
            capacity,
            refill_amount,
            refill_period: Duration::from_millis(millis as u64),
        })
    }

    /// Maximum number of tokens a bucket can hold.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Tokens added per elapsed period.
    pub fn refill_amount(&self) -> u64 {
        self.refill_amount
    }

    /// Length of one refill tick.
    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }

    fn period_millis(&self) -> i64 {
        self.refill_period.as_millis() as i64
    }
}

impl Default for BucketConfiguration {
    /// Three tokens, refilled three at a time every five seconds.
    fn default() -> Self {
        Self {
            capacity: 3,
            refill_amount: 3,
            refill_period: Duration::from_secs(5),
        }
    }
}

/// The authoritative per-key values persisted by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketState {
    /// Tokens currently available, always within `0..=capacity`.
    pub available_tokens: u64,
    /// Start of the current refill tick, epoch milliseconds. Never decreases.
    pub last_refill_millis: i64,
}

impl BucketState {
    /// State of a bucket created at `now_millis`: full.
    pub fn full(config: &BucketConfiguration, now_millis: i64) -> Self {
        Self {
            available_tokens: config.capacity,
            last_refill_millis: now_millis,
        }
    }

    /// Add the tokens of every whole tick elapsed since the last refill.
    ///
    /// The timestamp advances by whole ticks only, so partial progress
    /// toward the next tick is kept. A clock reading earlier than the stored
    /// timestamp counts as zero elapsed time.
    pub fn refill(&mut self, config: &BucketConfiguration, now_millis: i64) {
        self.available_tokens = self.available_tokens.min(config.capacity);

        let elapsed = now_millis.saturating_sub(self.last_refill_millis);
        if elapsed <= 0 {
            return;
        }

        let period = config.period_millis();
        let ticks = elapsed / period;
        if ticks == 0 {
            return;
        }

        let added = (ticks as u64).saturating_mul(config.refill_amount);
        self.available_tokens = self
            .available_tokens
            .saturating_add(added)
            .min(config.capacity);
        self.last_refill_millis += ticks * period;
    }

    /// Take `amount` tokens if that many are available.
    pub fn try_consume(&mut self, amount: u64) -> bool {
        if self.available_tokens >= amount {
            self.available_tokens -= amount;
            true
        } else {
            false
        }
    }

    /// Refill, attempt to consume, and describe the outcome.
    pub fn consume(
        &mut self,
        config: &BucketConfiguration,
        now_millis: i64,
        amount: u64,
    ) -> ConsumptionProbe {
        self.refill(config, now_millis);
        let consumed = self.try_consume(amount);

        let nanos_to_wait_for_refill = if consumed {
            0
        } else {
            self.nanos_until_available(config, now_millis, amount)
        };

        ConsumptionProbe {
            consumed,
            remaining_tokens: self.available_tokens,
            nanos_to_wait_for_refill,
        }
    }

    /// Time until `amount` tokens will be available, assuming no other
    /// consumption. `u64::MAX` when `amount` exceeds the capacity.
    fn nanos_until_available(
        &self,
        config: &BucketConfiguration,
        now_millis: i64,
        amount: u64,
    ) -> u64 {
        if amount <= self.available_tokens {
            return 0;
        }
        if amount > config.capacity {
            return u64::MAX;
        }

        let deficit = amount - self.available_tokens;
        let ticks_needed = deficit.div_ceil(config.refill_amount);
        let ready_at = (ticks_needed as i64)
            .saturating_mul(config.period_millis())
            .saturating_add(self.last_refill_millis);
        let wait_millis = ready_at.saturating_sub(now_millis).max(0) as u64;

        wait_millis.saturating_mul(1_000_000)
    }
}

/// Outcome of one consume attempt against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumptionProbe {
    /// Whether the tokens were taken.
    pub consumed: bool,
    /// Tokens left in the bucket after the attempt.
    pub remaining_tokens: u64,
    /// Nanoseconds until a retry of the same amount could succeed; zero when
    /// consumed, `u64::MAX` when the amount exceeds the capacity.
    pub nanos_to_wait_for_refill: u64,
}

impl ConsumptionProbe {
    /// The wait as a `Duration`, or `None` if the attempt can never succeed.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.nanos_to_wait_for_refill {
            u64::MAX => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }
}
