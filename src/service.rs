//! A small service whose operations are guarded by the limiter.
//!
//! Each operation names its own quota key and wraps its body in
//! [`RateLimiter::guard`].

use std::sync::Arc;

use tracing::instrument;

use crate::ratelimit::{GuardError, RateLimiter};

/// Quota key guarding [`DemoService::run1`].
pub const RUN1_KEY: &str = "someUniqueKey1";
/// Quota key guarding [`DemoService::run2`].
pub const RUN2_KEY: &str = "someUniqueKey2";

/// Response body of an accepted call.
pub const ACCEPTED: &str = "request accepted";

/// Demo service with two independently limited operations.
#[derive(Debug, Clone)]
pub struct DemoService {
    limiter: Arc<RateLimiter>,
}

impl DemoService {
    /// Create a service guarded by `limiter`.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    /// First guarded operation.
    #[instrument(skip(self), fields(instance = %self.limiter.instance_id()))]
    pub async fn run1(&self) -> Result<&'static str, GuardError> {
        self.limiter.guard(RUN1_KEY, || async { ACCEPTED }).await
    }

    /// Second guarded operation, with its own quota.
    #[instrument(skip(self), fields(instance = %self.limiter.instance_id()))]
    pub async fn run2(&self) -> Result<&'static str, GuardError> {
        self.limiter.guard(RUN2_KEY, || async { ACCEPTED }).await
    }

    /// The limiter guarding this service.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}
