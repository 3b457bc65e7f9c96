//! Deployment-wide bucket policy.
//!
//! Every instance sharing a store must build the same policy: two instances
//! disagreeing on a key's capacity would enforce that key inconsistently.

use std::collections::HashMap;

use tracing::info;

use super::bucket::BucketConfiguration;
use super::key::BucketKey;

/// The default bucket configuration plus optional per-key overrides.
#[derive(Debug, Clone, Default)]
pub struct BucketPolicy {
    default: BucketConfiguration,
    overrides: HashMap<String, BucketConfiguration>,
}

impl BucketPolicy {
    /// A policy applying `default` to every key.
    pub fn new(default: BucketConfiguration) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Use `config` instead of the default for `key`.
    pub fn with_override(mut self, key: &BucketKey, config: BucketConfiguration) -> Self {
        info!(
            key = %key,
            capacity = config.capacity(),
            refill_amount = config.refill_amount(),
            refill_period_ms = config.refill_period().as_millis() as u64,
            "Registered bucket override"
        );
        self.overrides.insert(key.as_str().to_string(), config);
        self
    }

    /// The configuration new buckets for `key` are created with.
    pub fn configuration_for(&self, key: &BucketKey) -> BucketConfiguration {
        self.overrides
            .get(key.as_str())
            .copied()
            .unwrap_or(self.default)
    }

    /// The configuration applied to keys without an override.
    pub fn default_configuration(&self) -> BucketConfiguration {
        self.default
    }

    /// Number of keys with an override.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_applies_to_unknown_keys() {
        let policy = BucketPolicy::default();
        let key = BucketKey::new("anything").unwrap();
        assert_eq!(policy.configuration_for(&key), BucketConfiguration::default());
    }

    #[test]
    fn test_override_wins_for_its_key_only() {
        let premium = BucketKey::new("premium").unwrap();
        let basic = BucketKey::new("basic").unwrap();
        let big = BucketConfiguration::new(100, 10, Duration::from_secs(1)).unwrap();

        let policy = BucketPolicy::default().with_override(&premium, big);

        assert_eq!(policy.configuration_for(&premium), big);
        assert_eq!(policy.configuration_for(&basic), BucketConfiguration::default());
        assert_eq!(policy.override_count(), 1);
    }
}
