//! Configuration management for Bucketeer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{BucketeerError, Result};
use crate::ratelimit::{BucketConfiguration, BucketKey, BucketPolicy};
use crate::store::{BucketStore, MemoryStore, PostgresStore, PostgresStoreOptions};

/// Main configuration for Bucketeer.
///
/// The `bucket` and `overrides` sections must be identical on every
/// instance that shares a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketeerConfig {
    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Default bucket applied to every key
    #[serde(default)]
    pub bucket: BucketSettings,

    /// Per-key bucket overrides
    #[serde(default)]
    pub overrides: HashMap<String, BucketSettings>,
}

/// Which store backs the buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store, shared only by limiters in this process
    #[default]
    Memory,
    /// PostgreSQL table shared by every connected process
    Postgres,
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store implementation
    #[serde(default)]
    pub backend: StoreBackend,

    /// PostgreSQL connection string
    #[serde(default)]
    pub database_url: Option<String>,

    /// PostgreSQL pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Bound on the wait for a contended row lock, in milliseconds
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,

    /// Table holding bucket rows
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: None,
            max_connections: default_max_connections(),
            lock_timeout_ms: default_lock_timeout(),
            table_name: default_table_name(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_lock_timeout() -> u64 {
    2000
}

fn default_table_name() -> String {
    "bucket_state".to_string()
}

/// Bucket capacity and refill settings as written in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSettings {
    /// Maximum tokens held
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Tokens added per refill period
    #[serde(default = "default_refill_amount")]
    pub refill_amount: u64,

    /// Refill period in milliseconds
    #[serde(default = "default_refill_period")]
    pub refill_period_ms: u64,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_amount: default_refill_amount(),
            refill_period_ms: default_refill_period(),
        }
    }
}

fn default_capacity() -> u64 {
    3
}

fn default_refill_amount() -> u64 {
    3
}

fn default_refill_period() -> u64 {
    5000
}

impl BucketSettings {
    /// Validate into a bucket configuration.
    pub fn to_configuration(&self) -> Result<BucketConfiguration> {
        BucketConfiguration::new(
            self.capacity,
            self.refill_amount,
            Duration::from_millis(self.refill_period_ms),
        )
    }
}

impl BucketeerConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| BucketeerError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Build the bucket policy, rejecting invalid settings.
    pub fn bucket_policy(&self) -> Result<BucketPolicy> {
        let default = self
            .bucket
            .to_configuration()
            .map_err(|e| BucketeerError::Config(format!("bucket: {}", e)))?;

        let mut policy = BucketPolicy::new(default);
        for (raw_key, settings) in &self.overrides {
            let key = BucketKey::new(raw_key.as_str())
                .map_err(|e| BucketeerError::Config(format!("overrides: {}", e)))?;
            let config = settings
                .to_configuration()
                .map_err(|e| BucketeerError::Config(format!("overrides.{}: {}", raw_key, e)))?;
            policy = policy.with_override(&key, config);
        }
        Ok(policy)
    }
}

impl StoreConfig {
    /// PostgreSQL connection settings. Fails when no URL is configured.
    pub fn postgres_options(&self) -> Result<PostgresStoreOptions> {
        let database_url = self.database_url.clone().ok_or_else(|| {
            BucketeerError::Config("store.database_url is required for postgres".to_string())
        })?;

        Ok(PostgresStoreOptions {
            database_url,
            max_connections: self.max_connections,
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            table_name: self.table_name.clone(),
        })
    }

    /// Open the configured store.
    pub async fn open(&self) -> Result<Arc<dyn BucketStore>> {
        match self.backend {
            StoreBackend::Memory => {
                info!(lock_timeout_ms = self.lock_timeout_ms, "Using in-process bucket store");
                let store = MemoryStore::new()
                    .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms));
                Ok(Arc::new(store))
            }
            StoreBackend::Postgres => {
                let store = PostgresStore::connect(self.postgres_options()?).await?;
                Ok(Arc::new(store))
            }
        }
    }
}
