//! # Box Office Testing
//!
//! Test doubles for the box office engine.
//!
//! This crate provides:
//! - [`InMemoryStore`]: a row-locking in-memory implementation of the
//!   storage traits
//! - [`FixedClock`] and [`ManualClock`] for deterministic time
//! - [`AccountSeed`] and [`Harness`] for test setup
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_testing::{AccountSeed, Harness};
//!
//! #[tokio::test]
//! async fn buys_a_ticket() {
//!     let h = Harness::new();
//!     let buyer = h.store.seed_account(AccountSeed::new("Ada").balance(Money::from_units(1000)));
//!     let event = h.store.seed_event("Concert");
//!     let ticket = h.store.seed_ticket(event, "VIP", Money::from_units(500), 1);
//!
//!     let receipt = h.engine.purchase(buyer.id, ticket, 1).await.unwrap();
//!     assert_eq!(receipt.stock_after, 0);
//! }
//! ```

pub mod fixtures;
pub mod in_memory;

/// Mock implementations of Environment traits
pub mod mocks {
    use boxoffice_core::environment::Clock;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use boxoffice_testing::mocks::FixedClock;
    /// use boxoffice_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock a test moves by hand, e.g. across the cancellation deadline.
    ///
    /// # Example
    ///
    /// ```
    /// use boxoffice_testing::mocks::ManualClock;
    /// use boxoffice_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let start = Utc::now();
    /// let clock = ManualClock::new(start);
    /// clock.advance(Duration::hours(24));
    /// assert_eq!(clock.now(), start + Duration::hours(24));
    /// ```
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use fixtures::{AccountSeed, Harness};
pub use in_memory::{InMemoryStore, InMemoryTx};
pub use mocks::{FixedClock, ManualClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::environment::Clock;
    use chrono::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let start = test_clock().now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), start + Duration::minutes(90));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
