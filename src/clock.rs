//! Time sources for bucket refill.
//!
//! Stored timestamps are epoch milliseconds, so every clock reports that unit.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;

/// Source of the current time.
///
/// Implementors must be thread-safe; one clock is shared by every bucket a
/// store touches.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to a store and
/// keep another to advance it.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<RwLock<i64>>,
}

impl ManualClock {
    /// Create a clock frozen at `millis` since the epoch.
    pub fn new(millis: i64) -> Self {
        Self {
            millis: Arc::new(RwLock::new(millis)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut millis = self.millis.write();
        *millis = millis.saturating_add(by.as_millis() as i64);
    }

    /// Jump to an absolute time, possibly backwards.
    pub fn set_millis(&self, millis: i64) {
        *self.millis.write() = millis;
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        *self.millis.read()
    }
}
