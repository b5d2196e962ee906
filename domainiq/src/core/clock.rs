//! Wall-clock sources for the queue
//!
//! The queue reads calendar time (window boundaries, midnight resets, cache
//! ages) through [`Clock`] and suspends through tokio's timer. [`TokioClock`]
//! derives wall time from tokio's `Instant`, so pausing tokio time in tests
//! moves both in lockstep.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The operating system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time anchored to tokio's monotonic clock
///
/// # Example
///
/// ```
/// use domainiq::{Clock, TokioClock};
/// use chrono::{TimeZone, Utc};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let origin = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
/// let clock = TokioClock::starting_at(origin);
/// assert!(clock.now() >= origin);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin_wall: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Start reporting `wall` at the current tokio instant
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            origin_wall: wall,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        add_duration(self.origin_wall, self.origin.elapsed())
    }
}

/// `at + duration`, saturating at the largest representable time
pub fn add_duration(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `at - duration`, saturating at the smallest representable time
pub fn sub_duration(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Time left until `deadline`, zero if it has passed
pub fn until(now: DateTime<Utc>, deadline: DateTime<Utc>) -> Duration {
    (deadline - now).to_std().unwrap_or(Duration::ZERO)
}
