//! The refill/consume step shared by every bucket store.
//!
//! Stores must run [`refill_consume`] as one indivisible step per key pair.
//! The Redis store runs a Lua transcription of it; the in-memory store runs
//! it inside a compare-and-swap loop.

/// Persisted state of one remote bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketState {
    /// Tokens left after the last successful consume
    pub tokens: i64,
    /// Unix seconds of the last successful consume
    pub last_refill: i64,
}

/// Result of one refill/consume evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefillOutcome {
    /// Whether a token was consumed
    pub allowed: bool,
    /// Tokens left in the bucket after this evaluation
    pub remaining: u64,
}

/// Evaluate one request against a bucket.
///
/// Absent state is treated as a full bucket last refilled at `now`. Every
/// full `refill_window_secs` since `last_refill` adds `max_tokens`, capped at
/// `max_tokens`. Returns the state to persist alongside the outcome; a denial
/// persists nothing so `last_refill` keeps pointing at the last consume.
pub fn refill_consume(
    stored_tokens: Option<i64>,
    stored_last_refill: Option<i64>,
    max_tokens: u64,
    refill_window_secs: u64,
    now: i64,
) -> (RefillOutcome, Option<BucketState>) {
    let max = i64::try_from(max_tokens).unwrap_or(i64::MAX);
    let window = i64::try_from(refill_window_secs).unwrap_or(i64::MAX).max(1);

    let tokens = stored_tokens.unwrap_or(max);
    let last_refill = stored_last_refill.unwrap_or(now);

    // A lastRefill written by a peer whose clock runs ahead must not drain the bucket.
    let elapsed = now.saturating_sub(last_refill).max(0);
    let tokens_to_add = (elapsed / window).saturating_mul(max);
    let available = tokens.saturating_add(tokens_to_add).min(max);

    if available > 0 {
        let remaining = available - 1;
        (
            RefillOutcome {
                allowed: true,
                remaining: remaining as u64,
            },
            Some(BucketState {
                tokens: remaining,
                last_refill: now,
            }),
        )
    } else {
        (
            RefillOutcome {
                allowed: false,
                remaining: available.max(0) as u64,
            },
            None,
        )
    }
}
