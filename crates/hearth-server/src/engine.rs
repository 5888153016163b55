//! The sync engine.
//!
//! One cycle: read the selected calendar, fetch the day window, classify,
//! upsert in one batch, evict rows that ended before the retention cutoff,
//! then stamp the last sync time. Failures before the upsert leave both the
//! store and the timestamp untouched.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hearth_core::{CachedEvent, Clock, DisplayEvent, SyncStatus, SystemClock, sync_status};
use hearth_providers::{CalendarInfo, CredentialStore, RemoteCalendarClient};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::EventStore;
use crate::today::{Subscription, TodayProjector};

/// Outcome of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum SyncResult {
    /// No calendar is selected; nothing was fetched or written.
    NoCalendarSelected,
    /// The cycle completed; carries the number of rows upserted.
    Success(usize),
    /// The remote rejected the credentials.
    NotAuthenticated,
    /// Any other failure, with a human-readable message.
    Error(String),
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCalendarSelected => f.write_str("no calendar selected"),
            Self::Success(1) => f.write_str("synced 1 event"),
            Self::Success(n) => write!(f, "synced {} events", n),
            Self::NotAuthenticated => f.write_str("not authenticated"),
            Self::Error(message) => write!(f, "sync failed: {}", message),
        }
    }
}

/// Orchestrates sync cycles over injected capabilities.
pub struct SyncEngine {
    credentials: Arc<dyn CredentialStore>,
    remote: Arc<dyn RemoteCalendarClient>,
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("remote", &self.remote.name())
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        remote: Arc<dyn RemoteCalendarClient>,
        store: Arc<dyn EventStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            credentials,
            remote,
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Builder: replace the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Runs one fetch, reconcile and cache cycle.
    pub async fn sync_events(&self) -> SyncResult {
        let calendar_id = match self
            .with_credentials(|credentials| credentials.selected_calendar_id())
            .await
        {
            Ok(Some(calendar_id)) => calendar_id,
            Ok(None) => {
                info!("no calendar selected, skipping sync");
                return SyncResult::NoCalendarSelected;
            }
            Err(e) => {
                error!(error = %e, "failed to read credentials");
                return SyncResult::Error(format!("failed to read credentials: {}", e));
            }
        };

        let now = self.clock.now();
        let window = self.config.fetch_window(now);
        debug!(calendar_id = %calendar_id, window = %window, "fetching events");

        let remote_events = match self
            .remote
            .fetch_events_in_range(&calendar_id, window)
            .await
        {
            Ok(events) => events,
            Err(e) if e.is_auth_failure() => {
                warn!(calendar_id = %calendar_id, error = %e, "remote rejected credentials");
                return SyncResult::NotAuthenticated;
            }
            Err(e) => {
                warn!(
                    calendar_id = %calendar_id,
                    code = %e.code(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "fetch failed"
                );
                return SyncResult::Error(e.message().to_string());
            }
        };

        let fetched_at = self.clock.now();
        let rows: Vec<CachedEvent> = remote_events
            .into_iter()
            .map(|event| event.into_cached(fetched_at))
            .collect();
        let count = rows.len();
        let config_count = rows.iter().filter(|row| row.is_config_event).count();

        if let Err(e) = self.store.insert_events(rows).await {
            error!(calendar_id = %calendar_id, error = %e, "failed to store events");
            return SyncResult::Error(format!("failed to store events: {}", e));
        }

        let cutoff = self.config.retention_cutoff(now);
        match self.store.delete_old_events(cutoff).await {
            Ok(removed) if removed > 0 => debug!(removed, "evicted events past retention"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "eviction failed, continuing"),
        }

        self.stamp_last_sync().await;

        info!(
            calendar_id = %calendar_id,
            count,
            config_count,
            "sync completed"
        );
        SyncResult::Success(count)
    }

    /// Records the sync time, never moving it backwards.
    async fn stamp_last_sync(&self) {
        let now = self.clock.now();
        match self
            .with_credentials(move |credentials| credentials.advance_last_sync_time(now))
            .await
        {
            Ok(Ok(stamp)) => debug!(%stamp, "last sync recorded"),
            Ok(Err(e)) => error!(error = %e, "failed to record last sync time"),
            Err(e) => error!(error = %e, "failed to record last sync time"),
        }
    }

    /// Runs credential IO on the blocking pool.
    async fn with_credentials<T, F>(&self, f: F) -> Result<T, tokio::task::JoinError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CredentialStore) -> T + Send + 'static,
    {
        let credentials = self.credentials.clone();
        tokio::task::spawn_blocking(move || f(credentials.as_ref())).await
    }

    /// Selects the calendar to sync. Does not sync.
    pub fn select_calendar(&self, calendar_id: &str) -> ServerResult<()> {
        let calendar_id = calendar_id.trim();
        if calendar_id.is_empty() {
            return Err(ServerError::config("calendar id must not be empty"));
        }
        self.credentials.set_selected_calendar_id(Some(calendar_id))?;
        info!(calendar_id = %calendar_id, "calendar selected");
        Ok(())
    }

    /// Removes the selection and resets the last sync time to never.
    pub fn clear_calendar(&self) -> ServerResult<()> {
        self.credentials.set_selected_calendar_id(None)?;
        self.credentials.set_last_sync_time(None)?;
        info!("calendar deselected");
        Ok(())
    }

    pub fn selected_calendar_id(&self) -> Option<String> {
        self.credentials.selected_calendar_id()
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.credentials.last_sync_time()
    }

    /// Freshness of the cache right now.
    pub fn sync_status(&self) -> SyncStatus {
        sync_status(self.credentials.last_sync_time(), self.clock.now())
    }

    /// Calendars the signed-in account can read.
    pub async fn list_calendars(&self) -> ServerResult<Vec<CalendarInfo>> {
        Ok(self.remote.list_calendars().await?)
    }

    /// A projector over this engine's store, clock and zone.
    pub fn today(&self) -> TodayProjector {
        TodayProjector::new(self.store.clone(), self.clock.clone(), self.config.zone())
    }

    /// Live display events for the current local day.
    pub fn observe_todays_events(&self) -> Subscription<Vec<DisplayEvent>> {
        self.today().observe_todays_events()
    }
}
