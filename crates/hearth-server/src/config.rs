//! Sync engine configuration.

use chrono::{DateTime, Days, Duration, Utc};
use hearth_core::{DeviceZone, TimeWindow};

/// Knobs for one sync cycle.
///
/// The fetch horizon and retention cutoff are independent: a kiosk can fetch
/// a week ahead while only keeping today, or keep yesterday around while
/// fetching one day. Whole days of horizon are counted on the local
/// calendar, so a one-day horizon covers a 23 or 25 hour DST day completely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    fetch_horizon: Duration,
    retention_offset: Duration,
    zone: DeviceZone,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_horizon: Duration::days(1),
            retention_offset: Duration::zero(),
            zone: DeviceZone::Local,
        }
    }
}

impl SyncConfig {
    pub fn new(zone: DeviceZone) -> Self {
        Self {
            zone,
            ..Default::default()
        }
    }

    /// Builder: set the fetch horizon. Negative values are treated as zero.
    #[must_use]
    pub fn with_fetch_horizon(mut self, horizon: Duration) -> Self {
        self.fetch_horizon = horizon.max(Duration::zero());
        self
    }

    /// Builder: set the retention offset. Negative values are treated as zero.
    #[must_use]
    pub fn with_retention_offset(mut self, offset: Duration) -> Self {
        self.retention_offset = offset.max(Duration::zero());
        self
    }

    /// How far past local midnight the fetch window reaches.
    pub fn fetch_horizon(&self) -> Duration {
        self.fetch_horizon
    }

    /// How far before local midnight rows are still retained.
    pub fn retention_offset(&self) -> Duration {
        self.retention_offset
    }

    /// The zone whose wall clock defines "today".
    pub fn zone(&self) -> DeviceZone {
        self.zone
    }

    /// From local midnight of the day containing `now` to the local midnight
    /// `horizon` whole days later, plus any sub-day remainder.
    pub fn fetch_window(&self, now: DateTime<Utc>) -> TimeWindow {
        let horizon = self.fetch_horizon.max(Duration::zero());
        let today = self.zone.date_of(now);
        let start = self.zone.start_of(today);

        let days = horizon.num_days();
        let remainder = horizon - Duration::days(days);
        let end = u64::try_from(days)
            .ok()
            .and_then(|days| today.checked_add_days(Days::new(days)))
            .map_or(start + horizon, |date| self.zone.start_of(date) + remainder);

        TimeWindow::new(start, end.max(start))
    }

    /// Rows ending strictly before this instant are evicted.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.zone.start_of_day(now) - self.retention_offset
    }
}
