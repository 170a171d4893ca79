//! Clock abstraction.
//!
//! Production code reads the system clock; tests drive a [`ManualClock`]
//! so that TTL arithmetic and threshold advancement are deterministic.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::timestamp::Timestamp;

/// A source of hybrid-logical timestamps.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a new system clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or(i64::MAX);
        Timestamp::from_nanos(nanos)
    }
}

/// Manually driven clock for deterministic tests.
///
/// Time only moves when the test calls [`ManualClock::advance`] or
/// [`ManualClock::set`]; cloning shares the underlying reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a manual clock starting at the given wall nanos.
    #[must_use]
    pub fn new(start_nanos: i64) -> Self {
        Self {
            nanos: Arc::new(AtomicI64::new(start_nanos)),
        }
    }

    /// Sets the clock to an absolute wall reading.
    pub fn set(&self, nanos: i64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    /// Advances the clock by `duration`.
    pub fn advance(&self, duration: Duration) {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), Timestamp::from_nanos(1_000));

        clock.advance(Duration::from_nanos(500));
        assert_eq!(clock.now(), Timestamp::from_nanos(1_500));

        clock.set(10);
        assert_eq!(clock.now(), Timestamp::from_nanos(10));
    }

    #[test]
    fn system_clock_is_monotone_enough() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(a <= b);
    }
}
