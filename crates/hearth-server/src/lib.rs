//! Sync engine, local event store, today view and scheduler.
//!
//! The composition root builds a [`SyncEngine`] from three capabilities:
//! a credential store, a remote calendar client and an [`EventStore`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hearth_providers::{ErrorClient, MemoryCredentialStore, ProviderError};
//! use hearth_server::{SqliteEventStore, SyncConfig, SyncEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SyncEngine::new(
//!     Arc::new(MemoryCredentialStore::new().with_calendar("family")),
//!     Arc::new(ErrorClient::new("offline", ProviderError::network("offline"))),
//!     Arc::new(SqliteEventStore::open_in_memory()?),
//!     SyncConfig::default(),
//! );
//! let result = engine.sync_events().await;
//! println!("{result} ({})", engine.sync_status());
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod error;
mod scheduler;
mod sqlite;
mod store;
mod today;

#[cfg(test)]
mod test_support;

pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncResult};
pub use error::{ServerError, ServerResult};
pub use scheduler::{
    Scheduler, SchedulerCommand, SchedulerConfig, SchedulerHandle, SchedulerState,
    SharedSchedulerState, SyncGate,
};
pub use sqlite::SqliteEventStore;
pub use store::{EventStore, EventStream, StoreError, StoreResult};
pub use today::{Subscription, TodayProjector};
