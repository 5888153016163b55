//! Event types for the kiosk calendar.
//!
//! Events move through three shapes:
//! - [`RemoteEvent`]: an immutable record fetched from the remote calendar,
//!   already classified as a display event or a configuration directive
//! - [`CachedEvent`]: a row of the local event store, stamped with the time it
//!   was written
//! - [`DisplayEvent`]: the display-ready projection handed to the renderer
//!
//! Classification is a pure function of the title: anything starting with the
//! reserved [`CONFIG_TAG`] is a configuration directive. Directives are cached
//! like any other event and only filtered out when projecting the today view.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::time::TimeWindow;

/// The reserved title prefix marking a configuration directive.
pub const CONFIG_TAG: &str = "[CONFIG]";

static CONFIG_TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[CONFIG\]").expect("Invalid config title regex"));

/// Returns true if the title marks a configuration directive rather than a
/// display event.
///
/// Leading whitespace is ignored; the tag itself is matched case-sensitively.
pub fn is_config_title(title: &str) -> bool {
    CONFIG_TITLE_REGEX.is_match(title)
}

/// An event as fetched from the remote calendar.
///
/// The configuration flag is derived from the title at construction time and
/// the record is immutable afterwards, so the flag can never drift from the
/// title it was computed from. Deserializing goes through [`RemoteEvent::new`]
/// as well; a serialized `is_config_event` is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RemoteEventRecord")]
pub struct RemoteEvent {
    id: String,
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    is_all_day: bool,
    is_config_event: bool,
}

impl RemoteEvent {
    /// Creates a timed event and classifies it.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        let is_config_event = is_config_title(&title);
        Self {
            id: id.into(),
            title,
            start,
            end,
            is_all_day: false,
            is_config_event,
        }
    }

    /// Builder: mark the event as spanning whole days.
    #[must_use]
    pub fn with_all_day(mut self, is_all_day: bool) -> Self {
        self.is_all_day = is_all_day;
        self
    }

    /// The identifier, unique within its calendar.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn is_all_day(&self) -> bool {
        self.is_all_day
    }

    /// Whether the title marks this event as a configuration directive.
    pub fn is_config_event(&self) -> bool {
        self.is_config_event
    }

    /// Converts to a store row written at `fetched_at`.
    pub fn into_cached(self, fetched_at: DateTime<Utc>) -> CachedEvent {
        CachedEvent {
            id: self.id,
            title: self.title,
            start: self.start,
            end: self.end,
            is_all_day: self.is_all_day,
            is_config_event: self.is_config_event,
            fetched_at,
        }
    }
}

#[derive(Deserialize)]
struct RemoteEventRecord {
    id: String,
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(default)]
    is_all_day: bool,
}

impl From<RemoteEventRecord> for RemoteEvent {
    fn from(record: RemoteEventRecord) -> Self {
        Self::new(record.id, record.title, record.start, record.end)
            .with_all_day(record.is_all_day)
    }
}

/// A row of the local event store.
///
/// The identifier is the primary key: writing a row with an existing
/// identifier replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    pub is_config_event: bool,
    /// When this row was last written by a sync cycle.
    pub fetched_at: DateTime<Utc>,
}

impl CachedEvent {
    /// Returns true if the event overlaps the half-open window.
    pub fn overlaps(&self, window: &TimeWindow) -> bool {
        window.overlaps(self.start, self.end)
    }

    /// Returns true if the event ended strictly before `cutoff`.
    pub fn ended_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.end < cutoff
    }

    /// Projects the row into its display representation.
    ///
    /// Returns `None` for configuration directives, which never reach the
    /// display layer.
    pub fn to_display(&self) -> Option<DisplayEvent> {
        if self.is_config_event {
            return None;
        }
        Some(DisplayEvent {
            id: self.id.clone(),
            title: self.title.clone(),
            start: self.start,
            end: self.end,
            is_all_day: self.is_all_day,
        })
    }
}

/// A display-ready event for the today view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
}

impl DisplayEvent {
    /// Returns true if the event is in progress at `now`.
    pub fn is_ongoing(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }
}
