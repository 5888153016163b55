//! Fakes shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};
use hearth_core::{CachedEvent, RemoteEvent, TimeWindow};
use hearth_providers::{
    BoxFuture, CalendarInfo, ProviderError, ProviderResult, RemoteCalendarClient,
};

use crate::sqlite::SqliteEventStore;
use crate::store::{EventStore, EventStream, StoreError, StoreResult};

/// 2024-03-15 at `h:m` UTC.
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, h, m, 0).unwrap()
}

/// Remote client that replays queued responses, then returns empty lists.
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<ProviderResult<Vec<RemoteEvent>>>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<(String, TimeWindow)>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, events: Vec<RemoteEvent>) {
        self.responses.lock().unwrap().push_back(Ok(events));
    }

    pub fn push_err(&self, error: ProviderError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<(String, TimeWindow)> {
        self.last_request.lock().unwrap().clone()
    }
}

impl RemoteCalendarClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch_events_in_range(
        &self,
        calendar_id: &str,
        window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<RemoteEvent>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some((calendar_id.to_string(), window));
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()));
        Box::pin(async move {
            tokio::task::yield_now().await;
            response
        })
    }

    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<CalendarInfo>>> {
        Box::pin(async {
            Ok(vec![
                CalendarInfo::new("me@example.com", "Me").with_primary(true),
                CalendarInfo::new("family", "Family"),
            ])
        })
    }
}

/// In-memory SQLite store that records what the engine asked of it.
pub struct RecordingStore {
    inner: SqliteEventStore,
    batches: Mutex<Vec<usize>>,
    delete_calls: AtomicUsize,
    last_cutoff: Mutex<Option<DateTime<Utc>>>,
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteEventStore::open_in_memory().unwrap(),
            batches: Mutex::new(Vec::new()),
            delete_calls: AtomicUsize::new(0),
            last_cutoff: Mutex::new(None),
            fail_inserts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Sizes of every batch passed to `insert_events`.
    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn last_cutoff(&self) -> Option<DateTime<Utc>> {
        *self.last_cutoff.lock().unwrap()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Writes rows without recording them.
    pub async fn seed(&self, rows: Vec<CachedEvent>) {
        self.inner.insert_events(rows).await.unwrap();
    }

    /// Every row within a year of the test day.
    pub async fn rows(&self) -> Vec<CachedEvent> {
        let window = TimeWindow::new(at(0, 0) - Duration::days(365), at(0, 0) + Duration::days(365));
        self.inner.events_in(window).await.unwrap()
    }
}

impl EventStore for RecordingStore {
    fn insert_events(&self, events: Vec<CachedEvent>) -> BoxFuture<'_, StoreResult<()>> {
        self.batches.lock().unwrap().push(events.len());
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Box::pin(async { Err(StoreError::Task("disk full".to_string())) });
        }
        self.inner.insert_events(events)
    }

    fn delete_old_events(&self, cutoff: DateTime<Utc>) -> BoxFuture<'_, StoreResult<usize>> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_cutoff.lock().unwrap() = Some(cutoff);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Box::pin(async { Err(StoreError::Task("database is locked".to_string())) });
        }
        self.inner.delete_old_events(cutoff)
    }

    fn events_for_day(&self, window: TimeWindow) -> EventStream {
        self.inner.events_for_day(window)
    }
}
