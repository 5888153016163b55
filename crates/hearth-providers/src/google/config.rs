//! Google Calendar client configuration.

use std::time::Duration;

use hearth_core::DeviceZone;

/// OAuth 2.0 client credentials from Google Cloud Console.
///
/// Only needed to refresh access tokens; a kiosk provisioned with a
/// long-lived access token can run without them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Validates that neither field is empty.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.trim().is_empty() {
            return Err("client_id is empty");
        }
        if self.client_secret.trim().is_empty() {
            return Err("client_secret is empty");
        }
        Ok(())
    }
}

/// Configuration for [`GoogleCalendarClient`](super::GoogleCalendarClient).
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Credentials for token refresh.
    pub credentials: Option<OAuthCredentials>,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Events requested per page.
    pub page_size: usize,
    /// Zone used to pin all-day dates to instants.
    pub zone: DeviceZone,
    /// Calendar API base URL.
    pub api_base: String,
    /// OAuth token endpoint.
    pub token_url: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            page_size: 250,
            zone: DeviceZone::Local,
            api_base: Self::API_BASE.to_string(),
            token_url: Self::TOKEN_URL.to_string(),
        }
    }
}

impl GoogleConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Base URL for Google Calendar API v3.
    pub const API_BASE: &'static str = "https://www.googleapis.com/calendar/v3";

    pub const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: OAuthCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_zone(mut self, zone: DeviceZone) -> Self {
        self.zone = zone;
        self
    }

    /// Points the client at a different server (tests, proxies).
    #[must_use]
    pub fn with_endpoints(mut self, api_base: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.token_url = token_url.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref credentials) = self.credentials {
            credentials.validate().map_err(|e| e.to_string())?;
        }
        if self.timeout.is_zero() {
            return Err("timeout must be greater than zero".to_string());
        }
        if self.page_size == 0 || self.page_size > 2500 {
            return Err("page_size must be between 1 and 2500".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_validation() {
        assert!(OAuthCredentials::new("id", "secret").validate().is_ok());
        assert_eq!(
            OAuthCredentials::new("", "secret").validate(),
            Err("client_id is empty")
        );
        assert_eq!(
            OAuthCredentials::new("id", "  ").validate(),
            Err("client_secret is empty")
        );
    }

    #[test]
    fn defaults_point_at_google() {
        let config = GoogleConfig::default();
        assert_eq!(config.api_base, GoogleConfig::API_BASE);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.credentials.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_and_validation() {
        let config = GoogleConfig::new()
            .with_credentials(OAuthCredentials::new("id", "secret"))
            .with_timeout(Duration::from_secs(5))
            .with_endpoints("http://127.0.0.1:9000/", "http://127.0.0.1:9000/token");
        assert_eq!(config.api_base, "http://127.0.0.1:9000");
        assert!(config.validate().is_ok());

        let config = GoogleConfig::new().with_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = GoogleConfig::new().with_credentials(OAuthCredentials::new("", "x"));
        assert_eq!(config.validate(), Err("client_id is empty".to_string()));
    }
}
