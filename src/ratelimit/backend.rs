//! Bucket store trait for abstracting shared and in-process implementations.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::bucket::RefillOutcome;
use super::key::BucketKey;

/// Failures talking to a bucket store.
///
/// Every variant means "the shared state is unavailable right now"; the
/// limiter reacts to all of them the same way.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("store did not answer within {0:?}")]
    Timeout(Duration),
    #[error("store protocol error: {0}")]
    Protocol(String),
}

/// One refill/consume evaluation to run against a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefillRequest {
    pub tokens_key: String,
    pub last_refill_key: String,
    pub max_tokens: u64,
    pub refill_window_secs: u64,
    /// Unix seconds as seen by the calling process
    pub now: i64,
}

impl RefillRequest {
    /// Build a request for a bucket key.
    pub fn new(key: &BucketKey, max_tokens: u64, refill_window_secs: u64, now: i64) -> Self {
        Self {
            tokens_key: key.tokens_key(),
            last_refill_key: key.last_refill_key(),
            max_tokens,
            refill_window_secs,
            now,
        }
    }
}

/// Trait for stores that hold remote bucket state.
///
/// Implementations must evaluate [`refill_consume`](super::refill_consume)
/// as one indivisible step: two concurrent calls for the same key pair must
/// never both observe the same pre-decrement token count.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Refill the bucket, then try to consume one token from it.
    async fn refill_consume(&self, request: &RefillRequest) -> Result<RefillOutcome, StoreError>;
}
