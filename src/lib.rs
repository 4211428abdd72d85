//! Tollgate - Distributed Token-Bucket Rate Limiting
//!
//! This crate decides whether an identity (e.g. a client address) may pass a
//! guarded route. Bucket state is shared between processes through Redis and
//! updated by one atomic script per check. When Redis cannot be reached each
//! limiter falls back to its own in-process buckets and, once those are
//! exhausted, to a fail-open or fail-closed policy.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LimiterConfig, RedisConfig, TollgateConfig};
pub use error::{Result, TollgateError};
pub use ratelimit::{Decision, DecisionSource, FailMode, RateLimiter};
pub use store::{MemoryBucketStore, RedisBucketStore};
