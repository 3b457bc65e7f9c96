//! Authoritative bucket state stores.
//!
//! A store holds one row per key and runs the refill-and-consume step
//! under an exclusive per-row lock. Rows of different keys never block each
//! other. Several limiters, in one process or many, may share a store.

mod memory;
mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::clock::Clock;
use crate::ratelimit::{BucketConfiguration, BucketKey, BucketState, ConsumptionProbe};

pub use memory::MemoryStore;
pub use postgres::{PostgresStore, PostgresStoreOptions};

/// Default bound on the wait for a contended row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Reasons a store could not reach a decision.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another transaction held the row lock for longer than the bound
    #[error("Timed out after {waited:?} waiting for the lock on bucket '{key}'")]
    LockTimeout { key: String, waited: Duration },

    /// The store cannot be reached at all
    #[error("Store unreachable: {0}")]
    Unavailable(String),

    /// The database aborted or refused the transaction
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row violates the bucket invariants
    #[error("Bucket '{key}' holds an invalid row: {detail}")]
    Corrupt { key: String, detail: String },
}

impl StoreError {
    /// Whether retrying later may succeed. Corrupt rows stay corrupt.
    pub fn is_transient(&self) -> bool {
        !matches!(self, StoreError::Corrupt { .. })
    }
}

/// Trait for bucket state stores.
///
/// This trait abstracts over the in-process `MemoryStore` and the shared
/// `PostgresStore` so the limiter works with either.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Atomically refill the row for `key` and try to take `amount` tokens.
    ///
    /// A missing row is created full inside the same locked step. The refill
    /// is persisted whether or not the tokens were taken.
    async fn try_consume(
        &self,
        key: &BucketKey,
        config: &BucketConfiguration,
        amount: u64,
    ) -> Result<ConsumptionProbe, StoreError>;

    /// Read the stored row for `key` as last committed, without refilling it.
    async fn snapshot(&self, key: &BucketKey) -> Result<Option<BucketState>, StoreError>;

    /// The time source refills are computed against.
    fn clock(&self) -> &dyn Clock;

    /// Tokens `key` could take right now, without taking or persisting
    /// anything. A key with no row yet reports full capacity.
    async fn available_tokens(
        &self,
        key: &BucketKey,
        config: &BucketConfiguration,
    ) -> Result<u64, StoreError> {
        let now = self.clock().now_millis();
        Ok(match self.snapshot(key).await? {
            Some(mut state) => {
                state.refill(config, now);
                state.available_tokens
            }
            None => config.capacity(),
        })
    }
}
