//! Explicit guards around rate-limited operations.
//!
//! A caller wraps the operation it wants limited in [`RateLimiter::guard`]
//! and branches on the result. There is no implicit interception.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use super::limiter::RateLimiter;
use crate::error::BucketeerError;

/// Why a guarded operation did not run.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The key's quota is exhausted
    #[error("Rate limit exceeded for key '{key}'")]
    RateLimited {
        key: String,
        retry_after: Option<Duration>,
    },

    /// The limiter could not decide; the quota state is unknown
    #[error(transparent)]
    Limiter(#[from] BucketeerError),
}

impl GuardError {
    /// Whether the operation was refused by policy rather than by a failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GuardError::RateLimited { .. })
    }
}

impl RateLimiter {
    /// Run `operation` only if one token for `key` can be taken.
    ///
    /// Every decision is logged with the key and a timestamp. A store failure
    /// is returned as `GuardError::Limiter`; the operation does not run.
    pub async fn guard<F, Fut, T>(&self, key: &str, operation: F) -> Result<T, GuardError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let probe = match self.try_consume_and_probe(key, 1).await {
            Ok(probe) => probe,
            Err(e) => {
                warn!(instance = %self.instance_id(), key = %key, error = %e, "Rate limit check failed");
                return Err(e.into());
            }
        };

        info!(
            instance = %self.instance_id(),
            key = %key,
            consumed = probe.consumed,
            remaining = probe.remaining_tokens,
            time = %Utc::now().to_rfc3339(),
            "Consumption decision"
        );

        if !probe.consumed {
            return Err(GuardError::RateLimited {
                key: key.to_string(),
                retry_after: probe.retry_after(),
            });
        }

        Ok(operation().await)
    }
}
