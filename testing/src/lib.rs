//! # Courtside Testing
//!
//! Test utilities for reducers and services built on `courtside-core`:
//!
//! - [`FixedClock`] / [`test_clock`]: deterministic, manually advanced time
//! - [`ReducerTest`]: Given-When-Then harness for reducers
//! - [`assertions`]: effect assertions
//!
//! ```ignore
//! use courtside_testing::{test_clock, ReducerTest};
//!
//! ReducerTest::new(ReservationReducer)
//!     .with_env(env_with(test_clock()))
//!     .given_state(state)
//!     .when_action(ReservationAction::Confirm { reservation_id })
//!     .then_state(|s| assert!(s.last_error.is_none()))
//!     .run();
//! ```

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use courtside_core::environment::Clock;
use std::sync::{Arc, PoisonError, RwLock};

pub mod reducer_test;

pub use reducer_test::{assertions, ReducerTest};

/// Clock that only moves when told to.
///
/// Clones share the same instant, so a clone handed to a service can be
/// advanced from the test body.
///
/// ```
/// use courtside_testing::FixedClock;
/// use courtside_core::environment::Clock;
/// use chrono::{Duration, Utc};
///
/// let clock = FixedClock::new(Utc::now());
/// let before = clock.now();
/// clock.advance(Duration::hours(1));
/// assert_eq!(clock.now() - before, Duration::hours(1));
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    /// Create a clock frozen at `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(RwLock::new(time)),
        }
    }

    /// Create a clock frozen at noon UTC on `date`.
    #[must_use]
    pub fn at_noon(date: NaiveDate) -> Self {
        let noon = date.and_hms_opt(12, 0, 0).unwrap_or_default();
        Self::new(Utc.from_utc_datetime(&noon))
    }

    /// Move the clock to `time`.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.write().unwrap_or_else(PoisonError::into_inner) = time;
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
        *time += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Default test clock: 2025-01-01 00:00:00 UTC.
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_default())
}
