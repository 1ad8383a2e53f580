//! Deterministic clock for tests
//!
//! Countdown and expiry logic must be testable without waiting on wall-clock
//! time. [`TestClock`] starts at a fixed instant and only moves when a test
//! advances it.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use aperture_core::environment::Clock;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, RwLock};

/// A shared, advanceable clock.
///
/// Clones share the same underlying instant, so a clock handed to an
/// environment can be advanced from the test body.
///
/// # Example
///
/// ```
/// use aperture_testing::test_clock;
/// use aperture_core::environment::Clock;
/// use chrono::Duration;
///
/// let clock = test_clock();
/// let start = clock.now();
/// clock.advance(Duration::seconds(90));
/// assert_eq!(clock.now() - start, Duration::seconds(90));
/// ```
#[derive(Clone, Debug)]
pub struct TestClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl TestClock {
    /// Create a clock starting at the given instant
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.write().unwrap();
        *now += delta;
    }

    /// Jump the clock to an absolute instant
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write().unwrap() = instant;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap()
    }
}

/// A clock fixed at a well-known instant (2025-06-01 12:00:00 UTC)
///
/// # Panics
///
/// Never panics; the instant is a valid calendar date.
#[must_use]
pub fn test_clock() -> TestClock {
    let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    TestClock::starting_at(start)
}
