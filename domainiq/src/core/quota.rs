//! Provider quota bookkeeping
//!
//! Two independent limits are tracked here:
//!
//! - a fixed request window (e.g. 15 calls per minute), rolled lazily whenever
//!   the queue is about to dispatch
//! - a daily exhaustion flag, set when the provider reports its quota is gone
//!   and cleared at the next scheduled reset
//!
//! Windows are aligned to multiples of the window length since the Unix
//! epoch, so a 60 second window always starts on a minute boundary.

use super::clock::add_duration;
use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When the daily quota reset fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetSchedule {
    /// Midnight in the host's local time zone
    #[default]
    DailyLocalMidnight,
    /// Midnight UTC
    DailyUtcMidnight,
}

impl ResetSchedule {
    /// First reset instant strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let next = match self {
            ResetSchedule::DailyUtcMidnight => now
                .date_naive()
                .succ_opt()
                .map(|day| day.and_time(NaiveTime::MIN).and_utc()),
            ResetSchedule::DailyLocalMidnight => {
                let today = now.with_timezone(&Local).date_naive();
                today
                    .succ_opt()
                    .and_then(|day| first_local_instant(&Local, day))
            }
        };

        next.unwrap_or_else(|| add_duration(now, Duration::from_secs(86_400)))
    }
}

/// Earliest valid instant of `day` in `tz`
///
/// Midnight can fall into a DST gap; in that case the first whole hour that
/// exists is used instead.
fn first_local_instant<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> Option<DateTime<Utc>> {
    (0..=3).find_map(|hour| {
        day.and_hms_opt(hour, 0, 0)
            .and_then(|naive| tz.from_local_datetime(&naive).earliest())
            .map(|local| local.with_timezone(&Utc))
    })
}

impl std::str::FromStr for ResetSchedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily-midnight" | "daily-local-midnight" | "local" => {
                Ok(ResetSchedule::DailyLocalMidnight)
            }
            "daily-utc-midnight" | "utc" => Ok(ResetSchedule::DailyUtcMidnight),
            _ => Err(format!(
                "Invalid reset schedule: {s}. Valid options are: daily-midnight, daily-local-midnight, daily-utc-midnight"
            )),
        }
    }
}

/// Quota counters owned by the queue task
#[derive(Debug, Clone)]
pub struct QuotaState {
    window: Duration,
    schedule: ResetSchedule,
    requests_this_window: u32,
    window_start: DateTime<Utc>,
    exhausted: bool,
    exhausted_until: Option<DateTime<Utc>>,
    next_reset: DateTime<Utc>,
}

impl QuotaState {
    pub fn new(window: Duration, schedule: ResetSchedule, now: DateTime<Utc>) -> Self {
        QuotaState {
            window,
            schedule,
            requests_this_window: 0,
            window_start: window_floor(now, window),
            exhausted: false,
            exhausted_until: None,
            next_reset: schedule.next_after(now),
        }
    }

    /// Start a fresh window if `now` has moved past the current one
    pub fn roll_window(&mut self, now: DateTime<Utc>) -> bool {
        let start = window_floor(now, self.window);
        if start > self.window_start {
            self.window_start = start;
            self.requests_this_window = 0;
            true
        } else {
            false
        }
    }

    pub fn has_capacity(&self, per_window_limit: u32) -> bool {
        self.requests_this_window < per_window_limit
    }

    /// Start of the window after the current one
    pub fn window_reopens_at(&self) -> DateTime<Utc> {
        add_duration(self.window_start, self.window)
    }

    pub fn record_dispatch(&mut self) {
        self.requests_this_window = self.requests_this_window.saturating_add(1);
    }

    /// Lock the provider out until the next scheduled reset
    pub fn mark_exhausted(&mut self) -> DateTime<Utc> {
        self.exhausted = true;
        self.exhausted_until = Some(self.next_reset);
        self.next_reset
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn exhausted_until(&self) -> Option<DateTime<Utc>> {
        self.exhausted_until
    }

    pub fn requests_this_window(&self) -> u32 {
        self.requests_this_window
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn next_reset(&self) -> DateTime<Utc> {
        self.next_reset
    }

    pub fn is_reset_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_reset
    }

    /// Clear exhaustion and counters, then schedule the following reset
    pub fn scheduled_reset(&mut self, now: DateTime<Utc>) {
        self.clear(now);
        self.next_reset = self.schedule.next_after(now);
    }

    /// Clear exhaustion and counters without moving the schedule
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.exhausted = false;
        self.exhausted_until = None;
        self.requests_this_window = 0;
        self.window_start = window_floor(now, self.window);
    }
}

/// Start of the fixed window containing `now`
fn window_floor(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window_ms = (window.as_millis() as i64).max(1);
    let now_ms = now.timestamp_millis();
    let offset = now_ms.rem_euclid(window_ms);
    now - TimeDelta::milliseconds(offset)
}
