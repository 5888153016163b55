//! Remote calendar client capability.
//!
//! The sync engine talks to the remote calendar only through
//! [`RemoteCalendarClient`]. A fetch either yields events or fails with a
//! [`ProviderError`]; the engine folds authentication failures into its
//! `NotAuthenticated` result and everything else into `Error`.

use std::future::Future;
use std::pin::Pin;

use hearth_core::{RemoteEvent, TimeWindow};

use crate::error::{ProviderError, ProviderResult};

/// A calendar the signed-in account can read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarInfo {
    pub id: String,
    pub name: String,
    pub is_primary: bool,
    /// IANA zone of the calendar, if the remote reports one.
    pub timezone: Option<String>,
}

impl CalendarInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_primary: false,
            timezone: None,
        }
    }

    #[must_use]
    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        self
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }
}

/// A boxed future for async trait methods.
///
/// Keeps the capability traits object-safe so they can be injected as
/// `Arc<dyn ...>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Authenticated range queries against a remote calendar.
///
/// Implementations own their authentication state. A missing, expired or
/// revoked credential must surface as an error whose code
/// [`is_auth_failure`](crate::ProviderErrorCode::is_auth_failure), so the
/// engine can tell the user to sign in again instead of retrying.
pub trait RemoteCalendarClient: Send + Sync {
    /// Short name for logs (e.g. "google").
    fn name(&self) -> &str;

    /// Fetches all events of `calendar_id` overlapping `window`.
    ///
    /// Recurring events are expanded into instances, each with its own
    /// identifier. Pagination is handled internally.
    fn fetch_events_in_range(
        &self,
        calendar_id: &str,
        window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<RemoteEvent>>>;

    /// Lists calendars the account can read, for the calendar picker.
    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<CalendarInfo>>>;
}

/// A client that fails every request with the same error.
///
/// Stands in for the real client when it cannot be configured, so the rest
/// of the system still runs and reports the problem through sync results.
#[derive(Debug)]
pub struct ErrorClient {
    name: String,
    error: ProviderError,
}

impl ErrorClient {
    pub fn new(name: impl Into<String>, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }

    fn error(&self) -> ProviderError {
        ProviderError::new(self.error.code(), self.error.message())
    }
}

impl RemoteCalendarClient for ErrorClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_events_in_range(
        &self,
        calendar_id: &str,
        _window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<RemoteEvent>>> {
        let error = self.error().with_calendar(calendar_id);
        Box::pin(async move { Err(error) })
    }

    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<CalendarInfo>>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }
}
