//! Cache freshness classification.
//!
//! The kiosk shows a small indicator telling the household whether the agenda
//! on screen is current. The signal is derived purely from the time of the
//! last successful sync; it never looks at the network.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Elapsed time at which a cache stops being fresh.
pub const STALE_AFTER: Duration = Duration::minutes(10);

/// Elapsed time at which the device is considered offline.
pub const OFFLINE_AFTER: Duration = Duration::minutes(60);

/// Coarse health of the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Synced within the last ten minutes.
    Ok,
    /// Last sync is between ten and sixty minutes old.
    Stale,
    /// Never synced, or the last sync is an hour old or more.
    Offline,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Stale => "stale",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies the cache given the last successful sync and the current time.
///
/// Boundaries are exact: ten minutes elapsed is already stale and sixty
/// minutes is already offline. A last-sync time in the future (clock skew)
/// counts as zero elapsed.
pub fn sync_status(last_sync: Option<DateTime<Utc>>, now: DateTime<Utc>) -> SyncStatus {
    let Some(last_sync) = last_sync else {
        return SyncStatus::Offline;
    };

    let elapsed = (now - last_sync).max(Duration::zero());
    if elapsed < STALE_AFTER {
        SyncStatus::Ok
    } else if elapsed < OFFLINE_AFTER {
        SyncStatus::Stale
    } else {
        SyncStatus::Offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn status_after(elapsed: Duration) -> SyncStatus {
        let last = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        sync_status(Some(last), last + elapsed)
    }

    #[test]
    fn never_synced_is_offline() {
        assert_eq!(sync_status(None, Utc::now()), SyncStatus::Offline);
    }

    #[test]
    fn boundary_truth_table() {
        let mins = Duration::minutes;
        let secs = Duration::seconds;

        assert_eq!(status_after(Duration::zero()), SyncStatus::Ok);
        assert_eq!(status_after(mins(9) + secs(59)), SyncStatus::Ok);
        assert_eq!(status_after(mins(10)), SyncStatus::Stale);
        assert_eq!(status_after(mins(59) + secs(59)), SyncStatus::Stale);
        assert_eq!(status_after(mins(60)), SyncStatus::Offline);
        assert_eq!(status_after(Duration::days(3)), SyncStatus::Offline);
    }

    #[test]
    fn sub_second_boundaries() {
        let just_under = Duration::minutes(10) - Duration::milliseconds(1);
        assert_eq!(status_after(just_under), SyncStatus::Ok);
    }

    #[test]
    fn future_sync_time_is_fresh() {
        assert_eq!(status_after(Duration::minutes(-5)), SyncStatus::Ok);
    }

    #[test]
    fn display_and_serde() {
        assert_eq!(SyncStatus::Stale.to_string(), "stale");
        assert_eq!(
            serde_json::to_string(&SyncStatus::Offline).unwrap(),
            "\"offline\""
        );
    }
}
