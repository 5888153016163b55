//! OAuth 2.0 token refresh for Google APIs.
//!
//! The interactive consent flow happens elsewhere (the admin UI); the kiosk
//! only ever trades a stored refresh token for a new access token.

use serde::Deserialize;
use tracing::info;

use crate::error::{ProviderError, ProviderResult};

use super::config::OAuthCredentials;

/// Refreshes access tokens against Google's token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    token_url: String,
    http_client: reqwest::Client,
}

/// Response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl OAuthClient {
    pub fn new(
        credentials: OAuthCredentials,
        token_url: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            credentials,
            token_url: token_url.into(),
            http_client,
        }
    }

    /// Trades a refresh token for a new access token.
    ///
    /// Returns the access token and its lifetime in seconds. A rejected
    /// refresh token is an authentication failure: the user has to sign in
    /// again.
    pub async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<(String, Option<i64>)> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                ProviderError::network(format!("token refresh request failed: {}", e))
                    .with_source(e)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

        if status.is_server_error() {
            return Err(ProviderError::server(format!(
                "token endpoint error ({})",
                status
            )));
        }
        if !status.is_success() {
            return Err(ProviderError::authentication(format!(
                "token refresh failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
        })?;

        info!("refreshed access token");
        Ok((token.access_token, token.expires_in))
    }
}
