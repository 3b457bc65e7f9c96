//! Rate limiting logic: keys, bucket math, policy, and the limiter facade.

mod bucket;
mod cache;
mod guard;
mod key;
mod limiter;
mod policy;

pub use bucket::{BucketConfiguration, BucketState, ConsumptionProbe};
pub use cache::{BucketHandle, LocalBucketCache};
pub use guard::GuardError;
pub use key::BucketKey;
pub use limiter::RateLimiter;
pub use policy::BucketPolicy;
