//! # Aperture Testing
//!
//! Testing utilities for the Aperture booking client architecture:
//!
//! - [`ReducerTest`]: fluent Given-When-Then harness for reducers
//! - [`assertions`]: helpers for asserting on returned effects
//! - [`TestClock`]: a shared, advanceable clock for deterministic
//!   time-dependent tests (countdowns, expiries)


/// Deterministic clock for tests
pub mod clock;

pub use clock::{TestClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
