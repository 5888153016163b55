//! Plain-text and JSON rendering for command output.

use chrono::{DateTime, Utc};
use hearth_core::{DeviceZone, DisplayEvent, ScheduledDirective, SyncStatus};
use hearth_providers::CalendarInfo;
use serde::Serialize;

const TIME_FORMAT: &str = "%H:%M";
const ALL_DAY: &str = "all day";
const EMPTY_DAY: &str = "Nothing on today.";

/// One line per event, in store order.
///
/// ```text
/// all day      School holiday
/// 09:00-10:00  Dentist (now)
/// ```
pub fn render_today(events: &[DisplayEvent], now: DateTime<Utc>, zone: DeviceZone) -> String {
    if events.is_empty() {
        return EMPTY_DAY.to_string();
    }

    events
        .iter()
        .map(|event| {
            let when = if event.is_all_day {
                format!("{:<11}", ALL_DAY)
            } else {
                format!(
                    "{}-{}",
                    zone.format(event.start, TIME_FORMAT),
                    zone.format(event.end, TIME_FORMAT)
                )
            };
            let now_marker = if event.is_ongoing(now) { " (now)" } else { "" };
            format!("{}  {}{}", when, event.title, now_marker)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Directive lines for the daemon log.
pub fn render_directives(directives: &[ScheduledDirective], zone: DeviceZone) -> String {
    directives
        .iter()
        .map(|d| format!("{}  {:?}", zone.format(d.start, TIME_FORMAT), d.directive))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Machine-readable status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub calendar_id: Option<String>,
    pub status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
}

pub fn render_status(report: &StatusReport, now: DateTime<Utc>, zone: DeviceZone) -> String {
    let calendar = report.calendar_id.as_deref().unwrap_or("none selected");
    let last_sync = match report.last_sync {
        Some(at) => format!("{} ({})", zone.format(at, "%Y-%m-%d %H:%M"), age(at, now)),
        None => "never".to_string(),
    };
    format!(
        "calendar:  {}\nstatus:    {}\nlast sync: {}",
        calendar, report.status, last_sync
    )
}

fn age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - at).num_minutes().max(0);
    match minutes {
        0 => "just now".to_string(),
        1..60 => format!("{} min ago", minutes),
        60..2880 => format!("{} h ago", minutes / 60),
        _ => format!("{} days ago", minutes / 1440),
    }
}

/// Machine-readable calendar list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEntry {
    pub id: String,
    pub name: String,
    pub primary: bool,
    pub selected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

pub fn calendar_entries(calendars: &[CalendarInfo], selected: Option<&str>) -> Vec<CalendarEntry> {
    calendars
        .iter()
        .map(|cal| CalendarEntry {
            id: cal.id.clone(),
            name: cal.name.clone(),
            primary: cal.is_primary,
            selected: selected == Some(cal.id.as_str()),
            timezone: cal.timezone.clone(),
        })
        .collect()
}

/// Calendar list, selected one marked with `*`.
pub fn render_calendars(calendars: &[CalendarInfo], selected: Option<&str>) -> String {
    if calendars.is_empty() {
        return "No calendars.".to_string();
    }

    calendars
        .iter()
        .map(|cal| {
            let marker = if selected == Some(cal.id.as_str()) { '*' } else { ' ' };
            let primary = if cal.is_primary { " (primary)" } else { "" };
            format!("{} {}  {}{}", marker, cal.name, cal.id, primary)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
