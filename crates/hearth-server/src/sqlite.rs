//! SQLite-backed event store.
//!
//! Instants are stored as epoch milliseconds. Writers bump a revision on a
//! `watch` channel after committing; live queries re-run on every bump and
//! only emit when their result actually changed.
//!
//! Commits from other connections, such as a second process on the same file,
//! never touch the channel. File-backed stores therefore also poll
//! `PRAGMA data_version`, which SQLite moves whenever another connection
//! commits.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream;
use hearth_core::{CachedEvent, TimeWindow};
use hearth_providers::BoxFuture;
use rusqlite::{Connection, params};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::store::{EventStore, EventStream, StoreError, StoreResult};

/// How often live queries on a file-backed store look for outside commits.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Event store on a single SQLite connection.
///
/// Cloning is cheap and shares the connection and change notifications.
#[derive(Clone)]
pub struct SqliteEventStore {
    inner: Arc<Inner>,
    /// `None` when no other connection can reach the database.
    poll: Option<Duration>,
}

struct Inner {
    conn: Mutex<Connection>,
    revision: watch::Sender<u64>,
}

impl std::fmt::Debug for SqliteEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEventStore")
            .field("revision", &*self.inner.revision.borrow())
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl SqliteEventStore {
    /// Opens (and if needed creates) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!("opened event store at {:?}", path);
        Ok(Self::with_connection(conn)?.with_poll_interval(DEFAULT_POLL_INTERVAL))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        migrate(&conn)?;
        let (revision, _) = watch::channel(0);
        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                revision,
            }),
            poll: None,
        })
    }

    /// Builder: how often live queries check for commits made through other
    /// connections.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll = Some(interval);
        self
    }

    /// Number of rows, for diagnostics.
    pub async fn count(&self) -> StoreResult<usize> {
        let inner = self.inner.clone();
        run_blocking(move || {
            let conn = inner.lock();
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
            Ok(count.max(0) as usize)
        })
        .await
    }

    /// Number of live queries currently attached.
    pub fn live_query_count(&self) -> usize {
        self.inner.revision.receiver_count()
    }

    /// One-shot query for rows overlapping `window`.
    pub async fn events_in(&self, window: TimeWindow) -> StoreResult<Vec<CachedEvent>> {
        let inner = self.inner.clone();
        run_blocking(move || inner.query(window)).await
    }
}

fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS events (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            start_ms        INTEGER NOT NULL,
            end_ms          INTEGER NOT NULL,
            is_all_day      INTEGER NOT NULL DEFAULT 0,
            is_config_event INTEGER NOT NULL DEFAULT 0,
            fetched_ms      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_end_ms ON events(end_ms);
        CREATE INDEX IF NOT EXISTS idx_events_start_ms ON events(start_ms);",
    )
}

async fn run_blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    fn upsert(&self, events: &[CachedEvent]) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO events (id, title, start_ms, end_ms, is_all_day, is_config_event, fetched_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    start_ms = excluded.start_ms,
                    end_ms = excluded.end_ms,
                    is_all_day = excluded.is_all_day,
                    is_config_event = excluded.is_config_event,
                    fetched_ms = excluded.fetched_ms",
            )?;
            for event in events {
                stmt.execute(params![
                    event.id,
                    event.title,
                    event.start.timestamp_millis(),
                    event.end.timestamp_millis(),
                    event.is_all_day,
                    event.is_config_event,
                    event.fetched_at.timestamp_millis(),
                ])?;
            }
        }
        tx.commit()?;
        drop(conn);
        self.notify();
        Ok(())
    }

    /// Moves whenever another connection commits to the database.
    fn data_version(&self) -> StoreResult<i64> {
        Ok(self
            .lock()
            .query_row("PRAGMA data_version", [], |row| row.get(0))?)
    }

    fn delete_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let removed = self.lock().execute(
            "DELETE FROM events WHERE end_ms < ?1",
            params![cutoff.timestamp_millis()],
        )?;
        if removed > 0 {
            self.notify();
        }
        Ok(removed)
    }

    fn query(&self, window: TimeWindow) -> StoreResult<Vec<CachedEvent>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, title, start_ms, end_ms, is_all_day, is_config_event, fetched_ms
             FROM events
             WHERE start_ms < ?2 AND end_ms > ?1
             ORDER BY start_ms, id",
        )?;
        let rows = stmt.query_map(
            params![window.start.timestamp_millis(), window.end.timestamp_millis()],
            |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    start_ms: row.get(2)?,
                    end_ms: row.get(3)?,
                    is_all_day: row.get(4)?,
                    is_config_event: row.get(5)?,
                    fetched_ms: row.get(6)?,
                })
            },
        )?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_cached()?);
        }
        Ok(events)
    }
}

struct RawRow {
    id: String,
    title: String,
    start_ms: i64,
    end_ms: i64,
    is_all_day: bool,
    is_config_event: bool,
    fetched_ms: i64,
}

impl RawRow {
    fn into_cached(self) -> StoreResult<CachedEvent> {
        let instant = |ms: i64, field: &str| {
            DateTime::from_timestamp_millis(ms).ok_or_else(|| StoreError::Malformed {
                id: self.id.clone(),
                message: format!("{} out of range: {}", field, ms),
            })
        };
        let start = instant(self.start_ms, "start")?;
        let end = instant(self.end_ms, "end")?;
        let fetched_at = instant(self.fetched_ms, "fetched_at")?;
        Ok(CachedEvent {
            id: self.id,
            title: self.title,
            start,
            end,
            is_all_day: self.is_all_day,
            is_config_event: self.is_config_event,
            fetched_at,
        })
    }
}

impl EventStore for SqliteEventStore {
    fn insert_events(&self, events: Vec<CachedEvent>) -> BoxFuture<'_, StoreResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            if events.is_empty() {
                return Ok(());
            }
            let count = events.len();
            run_blocking(move || inner.upsert(&events)).await?;
            debug!(count, "upserted events");
            Ok(())
        })
    }

    fn delete_old_events(&self, cutoff: DateTime<Utc>) -> BoxFuture<'_, StoreResult<usize>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let removed = run_blocking(move || inner.delete_before(cutoff)).await?;
            debug!(removed, cutoff = %cutoff, "evicted old events");
            Ok(removed)
        })
    }

    fn events_for_day(&self, window: TimeWindow) -> EventStream {
        let rx = self.inner.revision.subscribe();
        let state = LiveQuery {
            inner: self.inner.clone(),
            rx,
            window,
            last: None,
            data_version: None,
            poll_every: self.poll,
            poll: None,
        };
        stream::unfold(state, |mut state| async move {
            let snapshot = state.next_snapshot().await?;
            Some((snapshot, state))
        })
        .boxed()
    }
}

struct LiveQuery {
    inner: Arc<Inner>,
    rx: watch::Receiver<u64>,
    window: TimeWindow,
    last: Option<Vec<CachedEvent>>,
    /// `PRAGMA data_version` read just before the last query.
    data_version: Option<i64>,
    poll_every: Option<Duration>,
    poll: Option<Interval>,
}

impl LiveQuery {
    /// Waits for the next distinct result. The first call returns the
    /// current rows immediately.
    async fn next_snapshot(&mut self) -> Option<Vec<CachedEvent>> {
        loop {
            if self.last.is_some() {
                self.wait_for_change().await?;
            }
            self.rx.borrow_and_update();

            let inner = self.inner.clone();
            let window = self.window;
            let result = run_blocking(move || {
                let version = inner.data_version()?;
                Ok((version, inner.query(window)?))
            })
            .await;
            match result {
                Ok((version, rows)) => {
                    self.data_version = Some(version);
                    if self.last.as_ref() == Some(&rows) {
                        trace!("store changed outside window, no emission");
                        continue;
                    }
                    self.last = Some(rows.clone());
                    return Some(rows);
                }
                Err(e) => {
                    warn!("live query failed: {}", e);
                    if self.last.is_none() {
                        // Still emit an initial (empty) snapshot.
                        self.last = Some(Vec::new());
                        return Some(Vec::new());
                    }
                }
            }
        }
    }

    /// Resolves on a local write or, when polling, on a commit from another
    /// connection.
    async fn wait_for_change(&mut self) -> Option<()> {
        if let (None, Some(period)) = (&self.poll, self.poll_every) {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.poll = Some(interval);
        }

        loop {
            tokio::select! {
                changed = self.rx.changed() => return changed.ok(),
                () = tick(self.poll.as_mut()) => {
                    let inner = self.inner.clone();
                    match run_blocking(move || inner.data_version()).await {
                        Ok(version) if Some(version) != self.data_version => {
                            trace!(version, "outside commit detected");
                            return Some(());
                        }
                        Ok(_) => {}
                        Err(e) => warn!("data_version check failed: {}", e),
                    }
                }
            }
        }
    }
}

async fn tick(poll: Option<&mut Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::TempDir;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, h, m, 0).unwrap()
    }

    fn day() -> TimeWindow {
        TimeWindow::new(at(0, 0), at(0, 0) + ChronoDuration::days(1))
    }

    fn event(id: &str, title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CachedEvent {
        CachedEvent {
            id: id.to_string(),
            title: title.to_string(),
            start,
            end,
            is_all_day: false,
            is_config_event: hearth_core::is_config_title(title),
            fetched_at: at(6, 0),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = SqliteEventStore::open_in_memory().unwrap();
        store
            .insert_events(vec![event("a", "Dentist", at(9, 0), at(10, 0))])
            .await
            .unwrap();

        let mut updated = event("a", "Dentist (moved)", at(11, 0), at(12, 0));
        updated.fetched_at = at(7, 0);
        store.insert_events(vec![updated.clone()]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.events_in(day()).await.unwrap(), vec![updated]);
    }

    #[tokio::test]
    async fn query_returns_overlapping_rows_in_start_order() {
        let store = SqliteEventStore::open_in_memory().unwrap();
        let yesterday_late = event("y", "Party", at(0, 0) - ChronoDuration::hours(2), at(1, 0));
        let lunch = event("l", "Lunch", at(12, 0), at(13, 0));
        let breakfast = event("b", "Breakfast", at(8, 0), at(9, 0));
        let tomorrow = event("t", "Trip", at(0, 0) + ChronoDuration::days(1), at(0, 0) + ChronoDuration::days(2));
        let ended_at_midnight = event("e", "Movie", at(0, 0) - ChronoDuration::hours(2), at(0, 0));
        store
            .insert_events(vec![
                lunch.clone(),
                tomorrow,
                breakfast.clone(),
                yesterday_late.clone(),
                ended_at_midnight,
            ])
            .await
            .unwrap();

        let rows = store.events_in(day()).await.unwrap();
        assert_eq!(rows, vec![yesterday_late, breakfast, lunch]);
    }

    #[tokio::test]
    async fn delete_is_strictly_before_cutoff() {
        let store = SqliteEventStore::open_in_memory().unwrap();
        store
            .insert_events(vec![
                event("old", "Old", at(1, 0), at(2, 0)),
                event("edge", "Edge", at(2, 0), at(3, 0)),
                event("new", "New", at(3, 0), at(4, 0)),
            ])
            .await
            .unwrap();

        let removed = store.delete_old_events(at(3, 0)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("events.db");
        {
            let store = SqliteEventStore::open(&path).unwrap();
            store
                .insert_events(vec![event("a", "Dentist", at(9, 0), at(10, 0))])
                .await
                .unwrap();
        }
        let store = SqliteEventStore::open(&path).unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn live_query_emits_initial_then_changes() {
        let store = SqliteEventStore::open_in_memory().unwrap();
        store
            .insert_events(vec![event("a", "Dentist", at(9, 0), at(10, 0))])
            .await
            .unwrap();

        let mut live = store.events_for_day(day());
        let first = live.next().await.unwrap();
        assert_eq!(first.len(), 1);

        // A write outside the window does not produce a snapshot; the next
        // one inside does.
        let outside = event("t", "Trip", at(0, 0) + ChronoDuration::days(3), at(0, 0) + ChronoDuration::days(4));
        store.insert_events(vec![outside]).await.unwrap();
        store
            .insert_events(vec![event("b", "Lunch", at(12, 0), at(13, 0))])
            .await
            .unwrap();

        let second = live.next().await.unwrap();
        let ids: Vec<_> = second.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn live_query_sees_commits_from_another_connection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.db");
        let display = SqliteEventStore::open(&path)
            .unwrap()
            .with_poll_interval(Duration::from_millis(50));
        let daemon = SqliteEventStore::open(&path).unwrap();

        let mut live = display.events_for_day(day());
        assert!(live.next().await.unwrap().is_empty());

        daemon
            .insert_events(vec![event("a", "Dentist", at(9, 0), at(10, 0))])
            .await
            .unwrap();

        let snapshot = tokio::time::timeout(Duration::from_secs(3), live.next())
            .await
            .expect("write from the other connection was not observed")
            .unwrap();
        let titles: Vec<_> = snapshot.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Dentist"]);
    }

    #[test]
    fn only_file_stores_poll() {
        let dir = TempDir::new().unwrap();
        let file = SqliteEventStore::open(dir.path().join("events.db")).unwrap();
        assert_eq!(file.poll, Some(DEFAULT_POLL_INTERVAL));
        assert_eq!(SqliteEventStore::open_in_memory().unwrap().poll, None);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = SqliteEventStore::open_in_memory().unwrap();
        store.insert_events(Vec::new()).await.unwrap();
        assert_eq!(*store.inner.revision.borrow(), 0);
    }
}
