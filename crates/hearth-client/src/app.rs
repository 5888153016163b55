//! Composition root.
//!
//! Wires the file credential store, the SQLite cache and the remote client
//! into a [`SyncEngine`]. Every command builds exactly one [`App`].

use std::sync::Arc;

use hearth_providers::{FileCredentialStore, RemoteCalendarClient};
use hearth_server::{SqliteEventStore, SyncEngine};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientResult;

pub struct App {
    pub config: ClientConfig,
    pub credentials: Arc<FileCredentialStore>,
    pub store: SqliteEventStore,
    pub engine: Arc<SyncEngine>,
}

impl App {
    pub fn build(config: ClientConfig) -> ClientResult<Self> {
        let sync_config = config.sync.to_sync_config()?;

        let credentials_path = config.storage.credentials_path();
        let credentials = Arc::new(FileCredentialStore::open(&credentials_path)?);

        let database_path = config.storage.database_path();
        let store = SqliteEventStore::open(&database_path)?;
        debug!(
            credentials = %credentials_path.display(),
            database = %database_path.display(),
            "storage opened"
        );

        let remote = build_remote(&config, credentials.clone());
        let engine = SyncEngine::new(
            credentials.clone(),
            remote,
            Arc::new(store.clone()),
            sync_config,
        );

        Ok(Self {
            config,
            credentials,
            store,
            engine: Arc::new(engine),
        })
    }
}

/// The remote client. A misconfigured provider still yields a client, one
/// that fails every call, so offline commands keep working.
#[cfg(feature = "google")]
fn build_remote(
    config: &ClientConfig,
    credentials: Arc<FileCredentialStore>,
) -> Arc<dyn RemoteCalendarClient> {
    use hearth_providers::ErrorClient;
    use hearth_providers::google::GoogleCalendarClient;
    use tracing::warn;

    let client = config
        .sync
        .zone()
        .and_then(|zone| config.google.to_provider_config(zone))
        .and_then(|provider| Ok(GoogleCalendarClient::new(provider, credentials)?));

    match client {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(error = %e, "google client unavailable");
            Arc::new(ErrorClient::new(
                "google",
                hearth_providers::ProviderError::configuration(e.to_string()),
            ))
        }
    }
}

#[cfg(not(feature = "google"))]
fn build_remote(
    _config: &ClientConfig,
    _credentials: Arc<FileCredentialStore>,
) -> Arc<dyn RemoteCalendarClient> {
    use hearth_providers::{ErrorClient, ProviderError};

    Arc::new(ErrorClient::new(
        "none",
        ProviderError::configuration("built without a calendar provider"),
    ))
}
