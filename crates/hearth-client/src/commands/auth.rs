//! Credential commands.
//!
//! The interactive OAuth consent flow runs elsewhere; these commands store
//! its output where the sync engine can find it.

use chrono::Utc;
use hearth_providers::{CredentialStore, StoredToken};
use tracing::info;

use crate::app::App;
use crate::error::{ClientError, ClientResult};

/// Stores a token. Omitting the refresh token keeps the one already stored.
pub fn store_token(
    app: &App,
    access_token: &str,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
) -> ClientResult<()> {
    let access_token = access_token.trim();
    if access_token.is_empty() {
        return Err(ClientError::Config("access token must not be empty".to_string()));
    }

    let refresh_token = refresh_token.or_else(|| {
        app.credentials
            .token()
            .and_then(|previous| previous.refresh_token)
    });

    let mut token = StoredToken::new(access_token).expiring_in(Utc::now(), expires_in);
    if let Some(refresh_token) = refresh_token {
        token = token.with_refresh_token(refresh_token);
    }
    app.credentials.set_token(Some(token))?;

    info!(path = %app.credentials.path().display(), "token stored");
    println!("Token saved to {}", app.credentials.path().display());
    Ok(())
}

pub fn logout(app: &App) -> ClientResult<()> {
    app.credentials.set_token(None)?;
    println!("Signed out.");
    Ok(())
}
