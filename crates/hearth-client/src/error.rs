//! Client error types.

use hearth_core::{TimeError, TracingError};
use hearth_providers::{CredentialError, ProviderError};
use hearth_server::{ServerError, StoreError};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the `hearth` binary.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("sync failed: {0}")]
    Sync(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Tracing(#[from] TracingError),
}

impl From<TimeError> for ClientError {
    fn from(err: TimeError) -> Self {
        Self::Config(err.to_string())
    }
}
