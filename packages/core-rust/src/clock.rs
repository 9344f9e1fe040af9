//! The ambient, swappable UTC clock.
//!
//! Every due-time computation (promise claim windows, lock TTL refresh,
//! salvager scheduling) reads `now()` through this trait rather than calling
//! `SystemTime::now()` directly, so tests can substitute a [`ManualClock`] and
//! assert exact before/after states around a claim or expiry boundary.
//! Mirrors the teacher's `hlc::ClockSource` split between a real and a fixed
//! implementation.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current UTC instant, expressed as milliseconds since the
/// Unix epoch.
pub trait Clock: Send + Sync {
    /// The current instant, in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Reads the real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before Unix epoch")
            .as_millis() as i64
    }
}

/// A clock a test can move forward deterministically.
///
/// Starts at a fixed instant and only advances when told to — no wall-clock
/// reads happen at all, so assertions around exact `ClaimDuration` boundaries
/// are reproducible.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock fixed at `start_millis`.
    #[must_use]
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_millis),
        }
    }

    /// Moves the clock forward by `delta_millis` (may be negative to rewind
    /// in a test that needs to, though production code never does).
    pub fn advance_millis(&self, delta_millis: i64) {
        self.millis.fetch_add(delta_millis, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute instant.
    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now_millis();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = clock.now_millis();
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_advances_deterministically() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        clock.advance_millis(60_000);
        assert_eq!(clock.now_millis(), 61_000);
        clock.set_millis(0);
        assert_eq!(clock.now_millis(), 0);
    }
}
