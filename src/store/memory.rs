//! In-process bucket store.
//!
//! Holds the same two-keys-per-bucket layout as Redis, but keeps it in a
//! versioned map and makes the refill/consume step atomic with an optimistic
//! compare-and-swap loop. Useful for single-process deployments and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use crate::ratelimit::{
    refill_consume, BucketState, BucketStore, RefillOutcome, RefillRequest, StoreError,
};

/// A stored integer and the version of the write that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    value: i64,
    version: u64,
}

/// Versions of a bucket's two keys as seen by one read.
type Snapshot = (Option<Slot>, Option<Slot>);

/// An in-memory [`BucketStore`].
#[derive(Debug)]
pub struct MemoryBucketStore {
    entries: Mutex<HashMap<String, Slot>>,
    /// Source of write versions; never reused, so a key cannot ABA.
    next_version: AtomicU64,
    /// Cleared to simulate an outage
    available: AtomicBool,
    /// Commits lost to a concurrent writer
    conflicts: AtomicU64,
}

impl Default for MemoryBucketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBucketStore {
    /// Create an empty, available store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_version: AtomicU64::new(0),
            available: AtomicBool::new(true),
            conflicts: AtomicU64::new(0),
        }
    }

    /// Read a raw key.
    pub fn get(&self, key: &str) -> Option<i64> {
        self.entries.lock().get(key).map(|slot| slot.value)
    }

    /// Write a raw key, as another process sharing the store might.
    pub fn set(&self, key: &str, value: i64) {
        let version = self.bump_version();
        self.entries
            .lock()
            .insert(key.to_string(), Slot { value, version });
    }

    /// Mark the store reachable or unreachable.
    ///
    /// While unavailable every evaluation fails with a connection error.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Get the number of stored keys.
    pub fn key_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Get the number of commits that had to be retried.
    pub fn conflict_count(&self) -> u64 {
        self.conflicts.load(Ordering::SeqCst)
    }

    fn bump_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn snapshot(&self, request: &RefillRequest) -> Snapshot {
        let entries = self.entries.lock();
        (
            entries.get(&request.tokens_key).copied(),
            entries.get(&request.last_refill_key).copied(),
        )
    }

    /// Write `state` only if neither key changed since `seen` was read.
    fn commit(&self, request: &RefillRequest, seen: Snapshot, state: BucketState) -> bool {
        let mut entries = self.entries.lock();
        let current = (
            entries.get(&request.tokens_key).copied(),
            entries.get(&request.last_refill_key).copied(),
        );
        if current != seen {
            return false;
        }

        let version = self.bump_version();
        entries.insert(
            request.tokens_key.clone(),
            Slot {
                value: state.tokens,
                version,
            },
        );
        entries.insert(
            request.last_refill_key.clone(),
            Slot {
                value: state.last_refill,
                version,
            },
        );
        true
    }
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn refill_consume(&self, request: &RefillRequest) -> Result<RefillOutcome, StoreError> {
        if !self.is_available() {
            return Err(StoreError::Connection(
                "in-memory store marked unavailable".to_string(),
            ));
        }

        loop {
            let seen = self.snapshot(request);
            let (outcome, persist) = refill_consume(
                seen.0.map(|slot| slot.value),
                seen.1.map(|slot| slot.value),
                request.max_tokens,
                request.refill_window_secs,
                request.now,
            );

            // Denials write nothing; the snapshot was read atomically.
            let Some(state) = persist else {
                return Ok(outcome);
            };

            if self.commit(request, seen, state) {
                return Ok(outcome);
            }

            self.conflicts.fetch_add(1, Ordering::SeqCst);
            trace!(key = %request.tokens_key, "Bucket changed during evaluation, retrying");
            tokio::task::yield_now().await;
        }
    }
}
