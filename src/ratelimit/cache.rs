//! Process-local bucket handle cache.
//!
//! Handles carry the key and its configuration only. Token counts live in
//! the store and are never cached here.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::bucket::BucketConfiguration;
use super::key::BucketKey;
use super::policy::BucketPolicy;

/// A handle to one key's row in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketHandle {
    /// The key, used verbatim as the row identifier
    pub key: BucketKey,
    /// The configuration the row is governed by
    pub configuration: BucketConfiguration,
}

/// Key to handle map, filled lazily and kept for the process lifetime.
#[derive(Debug, Default)]
pub struct LocalBucketCache {
    handles: DashMap<BucketKey, Arc<BucketHandle>>,
}

impl LocalBucketCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the handle for `key`, creating it from `policy` on first use.
    ///
    /// Concurrent first resolutions of the same key build exactly one handle;
    /// every caller gets that same handle back.
    pub fn resolve(&self, key: &BucketKey, policy: &BucketPolicy) -> Arc<BucketHandle> {
        if let Some(handle) = self.handles.get(key) {
            return Arc::clone(handle.value());
        }

        let entry = self.handles.entry(key.clone()).or_insert_with(|| {
            let configuration = policy.configuration_for(key);
            debug!(
                key = %key,
                capacity = configuration.capacity(),
                refill_amount = configuration.refill_amount(),
                refill_period_ms = configuration.refill_period().as_millis() as u64,
                "Creating bucket handle"
            );
            Arc::new(BucketHandle {
                key: key.clone(),
                configuration,
            })
        });

        Arc::clone(entry.value())
    }

    /// Number of keys resolved so far.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no key has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
