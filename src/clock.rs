// src/clock.rs

// time sources for the lazy refill

// dependencies
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Clock trait to abstract time retrieval for balance recomputation.
///
/// `now` returns a timestamp in nanoseconds. Only differences between two
/// readings are used, so the epoch is up to the implementation. Readings are
/// allowed to go backwards; the bucket floors the refilled balance at the
/// credit limit when that happens.
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<u64, ClockError>;
}

/// Clock error type
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("system time is before the unix epoch")]
    SystemTimeError,
    #[error("system time overflows 64-bit nanoseconds")]
    Overflow,
}

/// Wall clock time, in nanoseconds since the Unix epoch.
///
/// This is the default clock of a [`TokenBucket`](crate::TokenBucket). Wall
/// clock adjustments show up as jumps in elapsed time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<u64, ClockError> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ClockError::SystemTimeError)?;
        nanos(since_epoch)
    }
}

fn nanos(elapsed: Duration) -> Result<u64, ClockError> {
    u64::try_from(elapsed.as_nanos()).map_err(|_| ClockError::Overflow)
}

/// Monotonic time measured from the moment the clock was created.
///
/// Backed by [`tokio::time::Instant`], so it never regresses and it follows
/// the runtime's paused clock in tests.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Result<u64, ClockError> {
        nanos(self.origin.elapsed())
    }
}
