//! Monotonic clock abstraction for the planner's time budget.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Source of monotonic time since an arbitrary origin. Queried, never awaited.
pub trait MonotonicClock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Real clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Deterministic clock that advances by a fixed step on every query.
#[derive(Debug)]
pub struct SteppingClock {
    step_nanos: u64,
    current_nanos: AtomicU64,
}

impl SteppingClock {
    pub fn new(step: Duration) -> Self {
        Self {
            step_nanos: u64::try_from(step.as_nanos()).unwrap_or(u64::MAX),
            current_nanos: AtomicU64::new(0),
        }
    }

    /// A clock that never advances.
    pub fn frozen() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Number of nanoseconds handed out so far.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.current_nanos.load(Ordering::SeqCst))
    }
}

impl MonotonicClock for SteppingClock {
    fn now(&self) -> Duration {
        let previous = self
            .current_nanos
            .fetch_add(self.step_nanos, Ordering::SeqCst);
        Duration::from_nanos(previous.saturating_add(self.step_nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stepping_clock_advances_per_query() {
        let clock = SteppingClock::new(Duration::from_millis(400));
        assert_eq!(clock.now(), Duration::from_millis(400));
        assert_eq!(clock.now(), Duration::from_millis(800));
        assert_eq!(clock.elapsed(), Duration::from_millis(800));
    }

    #[test]
    fn test_frozen_clock_stays_put() {
        let clock = SteppingClock::frozen();
        assert_eq!(clock.now(), Duration::ZERO);
        assert_eq!(clock.now(), Duration::ZERO);
    }
}
