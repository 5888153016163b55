//! Time handling for the kiosk.
//!
//! - [`TimeWindow`]: a half-open UTC interval used for fetch ranges and day
//!   queries
//! - [`DeviceZone`]: the wall-clock zone the kiosk lives in; "today" is always
//!   computed from the local date, never from UTC day boundaries
//! - [`Clock`]: the source of "now", injectable so tests can pin time

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from time configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    /// The zone name is not a known IANA identifier.
    #[error("unknown time zone: {0}")]
    UnknownZone(String),
}

/// A half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "TimeWindow start must be <= end");
        Self { start, end }
    }

    /// Creates a time window from a start time and duration.
    pub fn from_duration(start: DateTime<Utc>, duration: Duration) -> Self {
        Self::new(start, start + duration)
    }

    /// Returns the duration of this time window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Checks if an instant falls within this window.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }

    /// Checks if an event spanning `[start, end)` overlaps this window.
    ///
    /// An event overlaps if it starts before the window ends and ends after
    /// the window starts.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// The zone whose wall clock defines "today" for the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceZone {
    /// The operating system's local zone.
    #[default]
    Local,
    /// A fixed IANA zone, independent of the host configuration.
    Named(chrono_tz::Tz),
}

impl FromStr for DeviceZone {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        name.parse::<chrono_tz::Tz>()
            .map(Self::Named)
            .map_err(|_| TimeError::UnknownZone(name.to_string()))
    }
}

impl fmt::Display for DeviceZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

impl DeviceZone {
    /// The local calendar date at `now`.
    pub fn date_of(&self, now: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Local => now.with_timezone(&Local).date_naive(),
            Self::Named(tz) => now.with_timezone(tz).date_naive(),
        }
    }

    /// The first instant of the given local date.
    pub fn start_of(&self, date: NaiveDate) -> DateTime<Utc> {
        match self {
            Self::Local => first_instant_of(date, &Local),
            Self::Named(tz) => first_instant_of(date, tz),
        }
    }

    /// Local midnight of the day containing `now`.
    pub fn start_of_day(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of(self.date_of(now))
    }

    /// The whole local day containing `now`.
    ///
    /// Days are not always 24 hours long: DST transitions produce 23 and 25
    /// hour windows.
    pub fn day_window(&self, now: DateTime<Utc>) -> TimeWindow {
        let today = self.date_of(now);
        let tomorrow = today.succ_opt().unwrap_or(today);
        TimeWindow::new(self.start_of(today), self.start_of(tomorrow))
    }

    /// Formats an instant in this zone.
    pub fn format(&self, dt: DateTime<Utc>, fmt: &str) -> String {
        match self {
            Self::Local => dt.with_timezone(&Local).format(fmt).to_string(),
            Self::Named(tz) => dt.with_timezone(tz).format(fmt).to_string(),
        }
    }

    /// Converts a local wall-clock date-time to UTC.
    ///
    /// Ambiguous times resolve to the earlier instant, skipped times to the
    /// first valid instant after them.
    pub fn resolve_local(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self {
            Self::Local => resolve_in(local, &Local),
            Self::Named(tz) => resolve_in(local, tz),
        }
    }
}

fn first_instant_of<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    resolve_in(date.and_time(NaiveTime::MIN), tz)
}

fn resolve_in<Tz: TimeZone>(local: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    if let Some(dt) = tz.from_local_datetime(&local).earliest() {
        return dt.with_timezone(&Utc);
    }
    // Inside a DST gap; step forward in quarter hours for up to a day.
    (1..=4 * 24)
        .find_map(|minutes| {
            tz.from_local_datetime(&(local + Duration::minutes(15 * minutes)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| local.and_utc())
}

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jumps to the given instant.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Moves the clock forward (or backward, for negative durations).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
