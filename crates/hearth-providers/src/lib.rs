//! Capabilities the sync engine depends on.
//!
//! - [`CredentialStore`]: selected calendar, last sync time, OAuth token
//! - [`RemoteCalendarClient`]: authenticated range queries
//! - [`google`]: the Google Calendar implementation (feature `google`)

pub mod credentials;
pub mod error;
pub mod provider;

#[cfg(feature = "google")]
pub mod google;

pub use credentials::{
    CredentialError, CredentialResult, CredentialStore, FileCredentialStore,
    MemoryCredentialStore, StoredToken,
};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use provider::{BoxFuture, CalendarInfo, ErrorClient, RemoteCalendarClient};
