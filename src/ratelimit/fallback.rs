//! In-process fallback buckets used while the shared store is unreachable.

use dashmap::DashMap;
use tracing::debug;

/// A local bucket for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalBucket {
    /// Tokens left in the current window
    pub tokens: u64,
    /// Unix seconds when the current window started
    pub last_refill: i64,
}

impl LocalBucket {
    fn full(max_tokens: u64, now: i64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: now,
        }
    }

    /// Reset the bucket if a full window has elapsed, then take a token.
    ///
    /// Unlike the shared store this does not add per elapsed window; any
    /// full window snaps the bucket back to `max_tokens`.
    fn try_consume(&mut self, max_tokens: u64, refill_window_secs: u64, now: i64) -> Option<u64> {
        let elapsed = now.saturating_sub(self.last_refill);
        if elapsed >= 0 && elapsed as u64 >= refill_window_secs {
            self.tokens = max_tokens;
            self.last_refill = now;
        }

        if self.tokens > 0 {
            self.tokens -= 1;
            Some(self.tokens)
        } else {
            None
        }
    }
}

/// Per-limiter map of identity to local bucket.
///
/// Owned by exactly one limiter and never shared across processes, so counts
/// here are approximate across a fleet. Each identity's read-modify-write
/// runs under its map entry guard.
#[derive(Debug)]
pub struct LocalFallback {
    buckets: DashMap<String, LocalBucket>,
    max_tokens: u64,
    refill_window_secs: u64,
}

impl LocalFallback {
    pub fn new(max_tokens: u64, refill_window_secs: u64) -> Self {
        Self {
            buckets: DashMap::new(),
            max_tokens,
            refill_window_secs,
        }
    }

    /// Try to take a token for `identity`.
    ///
    /// Returns the tokens left on success, or `None` when the bucket is
    /// exhausted for the current window.
    pub fn try_consume(&self, identity: &str, now: i64) -> Option<u64> {
        let mut bucket = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| {
                debug!(identity = %identity, "Creating local fallback bucket");
                LocalBucket::full(self.max_tokens, now)
            });

        bucket.try_consume(self.max_tokens, self.refill_window_secs, now)
    }

    /// Get a copy of the bucket for `identity`, if one exists.
    pub fn bucket(&self, identity: &str) -> Option<LocalBucket> {
        self.buckets.get(identity).map(|b| *b)
    }

    /// Get the number of local buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
