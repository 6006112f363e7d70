//! Clock abstraction for determinism.
//!
//! Delivery dates, expirations and event timestamps are all taken from an
//! injected clock so delayed delivery can be driven in tests.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

/// Abstraction over system time for deterministic behavior.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the instant `delay` from now.
    fn after(&self, delay: TimeDelta) -> DateTime<Utc> {
        self.now() + delay
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
