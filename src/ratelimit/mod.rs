//! Rate limiting logic and state management.

mod backend;
mod bucket;
mod decision;
mod fallback;
mod key;
mod limiter;
mod policy;

pub use backend::{BucketStore, RefillRequest, StoreError};
pub use bucket::{refill_consume, BucketState, RefillOutcome};
pub use decision::{Decision, DecisionSource, Rejection, REJECTION_MESSAGE, REJECTION_STATUS};
pub use fallback::{LocalBucket, LocalFallback};
pub use key::BucketKey;
pub use limiter::RateLimiter;
pub use policy::FailMode;
