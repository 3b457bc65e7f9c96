//! In-process bucket store.
//!
//! Rows sit behind per-key async mutexes, which play the role of database
//! row locks: limiters sharing one `MemoryStore` behave like separate
//! processes sharing one database table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::{BucketStore, StoreError, DEFAULT_LOCK_TIMEOUT};
use crate::clock::{Clock, SystemClock};
use crate::ratelimit::{BucketConfiguration, BucketKey, BucketState, ConsumptionProbe};

/// A row slot. `None` until the first consume attempt creates the row.
type RowSlot = Arc<Mutex<Option<BucketState>>>;

/// A bucket store held in process memory.
pub struct MemoryStore {
    rows: DashMap<BucketKey, RowSlot>,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
    available: AtomicBool,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("rows", &self.rows.len())
            .field("lock_timeout", &self.lock_timeout)
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create an empty store reading time from `clock`.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            rows: DashMap::new(),
            clock: Arc::new(clock),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            available: AtomicBool::new(true),
        }
    }

    /// Bound the wait for a contended row.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Switch the store on or off. While off every call fails with
    /// `StoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of rows created so far.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is switched off".to_string()))
        }
    }

    fn slot(&self, key: &BucketKey) -> RowSlot {
        if let Some(slot) = self.rows.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.rows.entry(key.clone()).or_default().value())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn try_consume(
        &self,
        key: &BucketKey,
        config: &BucketConfiguration,
        amount: u64,
    ) -> Result<ConsumptionProbe, StoreError> {
        self.check_available()?;

        let slot = self.slot(key);
        let mut row = tokio::time::timeout(self.lock_timeout, slot.lock())
            .await
            .map_err(|_| {
                warn!(key = %key, waited = ?self.lock_timeout, "Row lock wait timed out");
                StoreError::LockTimeout {
                    key: key.to_string(),
                    waited: self.lock_timeout,
                }
            })?;

        let now = self.clock.now_millis();
        let state = row.get_or_insert_with(|| {
            debug!(key = %key, capacity = config.capacity(), "Creating bucket row");
            BucketState::full(config, now)
        });

        let probe = state.consume(config, now, amount);

        trace!(
            key = %key,
            amount = amount,
            consumed = probe.consumed,
            remaining = probe.remaining_tokens,
            last_refill = state.last_refill_millis,
            "Consume attempt committed"
        );

        Ok(probe)
    }

    async fn snapshot(&self, key: &BucketKey) -> Result<Option<BucketState>, StoreError> {
        self.check_available()?;

        let Some(slot) = self.rows.get(key).map(|s| Arc::clone(s.value())) else {
            return Ok(None);
        };
        let row = tokio::time::timeout(self.lock_timeout, slot.lock())
            .await
            .map_err(|_| StoreError::LockTimeout {
                key: key.to_string(),
                waited: self.lock_timeout,
            })?;
        Ok(*row)
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}
