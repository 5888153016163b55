//! Configuration directives encoded as calendar entries.
//!
//! An admin controls device behaviour by adding ordinary calendar events whose
//! title starts with `[CONFIG]`, e.g. `[CONFIG] SLEEP 21:00`. The sync engine
//! caches these like any other event; this module turns the cached rows into
//! typed directives.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::event::{CachedEvent, is_config_title};

static DIRECTIVE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\[CONFIG\]\s*(SLEEP|WAKE)\s+(\d{1,2}):(\d{2})\s*$")
        .expect("Invalid directive regex")
});

/// A device-behaviour instruction parsed from a config event title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ConfigDirective {
    /// Turn the display off at the given local time.
    Sleep(NaiveTime),
    /// Turn the display back on at the given local time.
    Wake(NaiveTime),
    /// A config entry this device does not understand; the text after the tag.
    Other(String),
}

impl ConfigDirective {
    /// Parses a title.
    ///
    /// Returns `None` if the title is not a config title at all.
    pub fn parse(title: &str) -> Option<Self> {
        if !is_config_title(title) {
            return None;
        }

        if let Some(caps) = DIRECTIVE_REGEX.captures(title) {
            let hour: u32 = caps[2].parse().ok()?;
            let minute: u32 = caps[3].parse().ok()?;
            if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
                return Some(match caps[1].to_ascii_uppercase().as_str() {
                    "SLEEP" => Self::Sleep(time),
                    _ => Self::Wake(time),
                });
            }
        }

        let rest = title
            .trim_start()
            .trim_start_matches(crate::event::CONFIG_TAG)
            .trim();
        Some(Self::Other(rest.to_string()))
    }
}

/// A directive together with the calendar entry that carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledDirective {
    pub event_id: String,
    pub directive: ConfigDirective,
    /// Start of the carrying calendar entry.
    pub start: DateTime<Utc>,
}

impl ScheduledDirective {
    /// Extracts the directive from a cached row, if it is a config row.
    pub fn from_cached(event: &CachedEvent) -> Option<Self> {
        if !event.is_config_event {
            return None;
        }
        let directive = ConfigDirective::parse(&event.title)?;
        Some(Self {
            event_id: event.id.clone(),
            directive,
            start: event.start,
        })
    }
}
