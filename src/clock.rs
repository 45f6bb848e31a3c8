//! Time source abstraction.
//!
//! Expiry is defined in absolute unix seconds (§3 of the design). Wiring the
//! cache through a [`Clock`] trait rather than calling `SystemTime::now()`
//! directly lets tests exercise TTL expiry deterministically, without
//! `sleep()`, the way `moka`'s sync cache supports a mockable expiration
//! clock for the same reason.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current time, in whole seconds since the unix epoch.
pub trait Clock: Send + Sync {
    /// Returns the current time in unix seconds.
    fn now(&self) -> i64;
}

/// The real wall clock, backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// A manually-advanced clock for deterministic TTL tests.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock starting at the given unix-seconds timestamp.
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Advances the clock by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute unix-seconds timestamp.
    pub fn set(&self, at: i64) {
        self.now.store(at, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        clock.advance(5);
        assert_eq!(clock.now(), 1_005);
        clock.set(42);
        assert_eq!(clock.now(), 42);
    }

    #[test]
    fn system_clock_is_plausible() {
        let now = SystemClock.now();
        assert!(now > 1_700_000_000);
    }
}
