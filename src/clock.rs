//! Wall-clock abstraction so bucket timing can be driven by hand in tests.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current unix time in whole seconds.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_secs(&self) -> i64;
}

/// Clock backed by the system wall clock.
///
/// Every process sharing a store compares its own reading against the
/// `lastRefill` written by the others, so hosts should be NTP-synced.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: AtomicI64,
}

impl ManualClock {
    pub fn new(secs: i64) -> Self {
        Self {
            secs: AtomicI64::new(secs),
        }
    }

    pub fn set(&self, secs: i64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> i64 {
        self.secs.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_secs(), 1_000);

        clock.advance(31);
        assert_eq!(clock.now_secs(), 1_031);

        clock.set(5);
        assert_eq!(clock.now_secs(), 5);
    }

    #[test]
    fn test_system_clock_is_unix_seconds() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_secs() > 1_577_836_800);
    }
}
