//! Server error types.

use hearth_providers::{CredentialError, ProviderError};
use thiserror::Error;

use crate::store::StoreError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors outside the sync cycle itself.
///
/// A sync cycle never fails with one of these; it reports a
/// [`SyncResult`](crate::SyncResult) instead.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("credential store error: {0}")]
    Credentials(#[from] CredentialError),

    #[error("event store error: {0}")]
    Store(#[from] StoreError),

    #[error("remote calendar error: {0}")]
    Provider(#[from] ProviderError),

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
