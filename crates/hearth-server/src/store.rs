//! Local event store capability.
//!
//! The engine writes through [`EventStore::insert_events`] and
//! [`EventStore::delete_old_events`]; the today view reads through the live
//! [`EventStore::events_for_day`] query.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use hearth_core::{CachedEvent, TimeWindow};
use hearth_providers::BoxFuture;
use thiserror::Error;

/// Errors from the local event store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open event store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("stored event {id} is malformed: {message}")]
    Malformed { id: String, message: String },

    #[error("storage task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A live query result: the current snapshot on subscribe, then a new
/// snapshot after every change that alters it. Dropping the stream ends the
/// subscription.
pub type EventStream = BoxStream<'static, Vec<CachedEvent>>;

/// Durable, queryable table of cached events.
pub trait EventStore: Send + Sync {
    /// Upserts a batch by identifier.
    ///
    /// Readers observe either none or all of the batch.
    fn insert_events(&self, events: Vec<CachedEvent>) -> BoxFuture<'_, StoreResult<()>>;

    /// Deletes rows whose end is strictly before `cutoff`. Returns how many
    /// were removed.
    fn delete_old_events(&self, cutoff: DateTime<Utc>) -> BoxFuture<'_, StoreResult<usize>>;

    /// Live query for rows overlapping `window`, ordered by start.
    fn events_for_day(&self, window: TimeWindow) -> EventStream;
}
