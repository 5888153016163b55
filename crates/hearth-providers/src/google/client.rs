//! Google Calendar API client.
//!
//! Range queries against `events.list` with server-side recurrence
//! expansion, plus `calendarList` for the calendar picker. The access token
//! lives in the [`CredentialStore`]; an expired token is refreshed before
//! the request and a `401` triggers one refresh and retry.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use hearth_core::{RemoteEvent, TimeWindow};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::credentials::{CredentialStore, StoredToken};
use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::provider::{BoxFuture, CalendarInfo, RemoteCalendarClient};

use super::config::GoogleConfig;
use super::oauth::OAuthClient;

/// Google Calendar client bound to a credential store.
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    config: GoogleConfig,
    oauth: Option<OAuthClient>,
    credentials: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for GoogleCalendarClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleCalendarClient")
            .field("api_base", &self.config.api_base)
            .field("can_refresh", &self.oauth.is_some())
            .finish_non_exhaustive()
    }
}

impl GoogleCalendarClient {
    /// Creates a client. Fails if the configuration is invalid.
    pub fn new(config: GoogleConfig, credentials: Arc<dyn CredentialStore>) -> ProviderResult<Self> {
        config.validate().map_err(ProviderError::configuration)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {}", e))
            })?;

        let oauth = config
            .credentials
            .clone()
            .map(|creds| OAuthClient::new(creds, config.token_url.clone(), http_client.clone()));

        Ok(Self {
            http_client,
            config,
            oauth,
            credentials,
        })
    }

    /// Returns a usable access token, refreshing it first if it has expired.
    pub async fn access_token(&self) -> ProviderResult<String> {
        let token = self
            .credentials
            .token()
            .ok_or_else(|| ProviderError::authentication("not signed in"))?;

        if token.is_expired(Utc::now()) {
            debug!("access token expired, refreshing");
            return self.refresh(&token).await;
        }
        Ok(token.access_token)
    }

    /// Forces a token refresh and persists the result.
    pub async fn refresh_access_token(&self) -> ProviderResult<String> {
        let token = self
            .credentials
            .token()
            .ok_or_else(|| ProviderError::authentication("not signed in"))?;
        self.refresh(&token).await
    }

    async fn refresh(&self, token: &StoredToken) -> ProviderResult<String> {
        let Some(ref oauth) = self.oauth else {
            return Err(ProviderError::authentication(
                "access token expired and no OAuth client is configured",
            ));
        };
        let Some(ref refresh_token) = token.refresh_token else {
            return Err(ProviderError::authentication(
                "access token expired and no refresh token is stored",
            ));
        };

        let (access_token, expires_in) = oauth.refresh_token(refresh_token).await?;
        let updated = token.refreshed(access_token.clone(), Utc::now(), expires_in);
        if let Err(e) = self.credentials.set_token(Some(updated)) {
            // The new token still works for this process.
            warn!("failed to persist refreshed token: {}", e);
        }
        Ok(access_token)
    }

    /// Issues an authorized GET, refreshing and retrying once on `401`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> ProviderResult<T> {
        let token = self.access_token().await?;
        match self.send_get(url, query, &token).await {
            Err(e) if e.code() == ProviderErrorCode::AuthenticationFailed && self.oauth.is_some() => {
                debug!("request rejected, refreshing token and retrying");
                let token = self.refresh_access_token().await?;
                self.send_get(url, query, &token).await
            }
            other => other,
        }
    }

    async fn send_get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> ProviderResult<T> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::network("request timeout")
                } else if e.is_connect() {
                    ProviderError::network(format!("connection failed: {}", e))
                } else {
                    ProviderError::network(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, retry_after));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse response: {}", e))
        })
    }

    /// Fetches every event instance of `calendar_id` overlapping `window`.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        window: TimeWindow,
    ) -> ProviderResult<Vec<RemoteEvent>> {
        let url = format!(
            "{}/calendars/{}/events",
            self.config.api_base,
            urlencoding::encode(calendar_id)
        );

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeMin", window.start.to_rfc3339()),
                ("timeMax", window.end.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", self.config.page_size.to_string()),
            ];
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.clone()));
            }

            let page: EventListResponse = self
                .get_json(&url, &query)
                .await
                .map_err(|e| e.with_calendar(calendar_id))?;

            events.extend(page.items.into_iter().filter_map(|e| self.convert_event(e)));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(
            "fetched {} events from calendar {}",
            events.len(),
            calendar_id
        );
        Ok(events)
    }

    /// Lists calendars the signed-in account can read.
    pub async fn calendars(&self) -> ProviderResult<Vec<CalendarInfo>> {
        let url = format!("{}/users/me/calendarList", self.config.api_base);
        let list: CalendarListResponse = self.get_json(&url, &[]).await?;
        Ok(list.items.into_iter().map(CalendarInfo::from).collect())
    }

    /// Converts an API event, skipping cancelled or unparseable ones.
    fn convert_event(&self, event: ApiEvent) -> Option<RemoteEvent> {
        if event.status.as_deref() == Some("cancelled") {
            return None;
        }

        let id = event.id?;
        let title = event.summary.unwrap_or_default();
        let is_all_day = event.start.date_time.is_none() && event.start.date.is_some();

        let start = self.resolve_time(&event.start, &id)?;
        let end = self.resolve_time(&event.end, &id)?;
        if end < start {
            warn!("event {} ends before it starts, skipping", id);
            return None;
        }

        Some(RemoteEvent::new(id, title, start, end).with_all_day(is_all_day))
    }

    /// Resolves a timed instant, or pins an all-day date to local midnight.
    fn resolve_time(&self, time: &ApiEventTime, event_id: &str) -> Option<DateTime<Utc>> {
        match (&time.date_time, &time.date) {
            (Some(dt), _) => DateTime::parse_from_rfc3339(dt)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| warn!("event {}: bad dateTime {:?}: {}", event_id, dt, e))
                .ok(),
            (None, Some(date)) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map(|date| self.config.zone.start_of(date))
                .map_err(|e| warn!("event {}: bad date {:?}: {}", event_id, date, e))
                .ok(),
            (None, None) => {
                warn!("event {} has no start or end", event_id);
                None
            }
        }
    }
}

impl RemoteCalendarClient for GoogleCalendarClient {
    fn name(&self) -> &str {
        "google"
    }

    fn fetch_events_in_range(
        &self,
        calendar_id: &str,
        window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<RemoteEvent>>> {
        let calendar_id = calendar_id.to_string();
        Box::pin(async move { self.list_events(&calendar_id, window).await })
    }

    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<CalendarInfo>>> {
        Box::pin(self.calendars())
    }
}

/// Maps a non-success HTTP status to a provider error.
fn status_error(status: reqwest::StatusCode, body: &str, retry_after: Option<u64>) -> ProviderError {
    use reqwest::StatusCode;

    match status {
        StatusCode::UNAUTHORIZED => {
            ProviderError::authentication("access token expired or invalid")
        }
        StatusCode::FORBIDDEN => ProviderError::authorization("access denied to calendar"),
        StatusCode::NOT_FOUND => ProviderError::not_found("calendar not found"),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(format!(
            "rate limit exceeded{}",
            retry_after
                .map(|s| format!(", retry after {} seconds", s))
                .unwrap_or_default()
        )),
        _ => ProviderError::server(format!("API error ({}): {}", status, body.trim())),
    }
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    start: ApiEventTime,
    end: ApiEventTime,
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListEntry {
    id: String,
    #[serde(default)]
    summary: String,
    summary_override: Option<String>,
    #[serde(default)]
    primary: bool,
    time_zone: Option<String>,
}

impl From<CalendarListEntry> for CalendarInfo {
    fn from(entry: CalendarListEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.summary_override.unwrap_or(entry.summary),
            is_primary: entry.primary,
            timezone: entry.time_zone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use chrono::{Duration, TimeZone};
    use hearth_core::DeviceZone;

    fn client(zone: &str) -> GoogleCalendarClient {
        let config = GoogleConfig::new().with_zone(zone.parse::<DeviceZone>().unwrap());
        GoogleCalendarClient::new(config, Arc::new(MemoryCredentialStore::new())).unwrap()
    }

    #[test]
    fn parse_event_list_response() {
        let json = r#"{
            "kind": "calendar#events",
            "items": [
                {
                    "id": "evt1_20240315T100000Z",
                    "summary": "Dentist",
                    "start": { "dateTime": "2024-03-15T10:00:00Z" },
                    "end": { "dateTime": "2024-03-15T11:00:00Z" },
                    "status": "confirmed"
                }
            ],
            "nextPageToken": "p2"
        }"#;

        let response: EventListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.next_page_token.as_deref(), Some("p2"));
        assert_eq!(response.items[0].summary.as_deref(), Some("Dentist"));
    }

    #[test]
    fn converts_timed_event() {
        let json = r#"{
            "id": "evt1",
            "summary": "[CONFIG] SLEEP 22:00",
            "start": { "dateTime": "2024-03-15T22:00:00+01:00" },
            "end": { "dateTime": "2024-03-15T22:15:00+01:00" }
        }"#;
        let event: ApiEvent = serde_json::from_str(json).unwrap();
        let converted = client("Europe/Paris").convert_event(event).unwrap();

        assert_eq!(converted.id(), "evt1");
        assert!(converted.is_config_event());
        assert!(!converted.is_all_day());
        assert_eq!(
            converted.start(),
            Utc.with_ymd_and_hms(2024, 3, 15, 21, 0, 0).unwrap()
        );
    }

    #[test]
    fn all_day_dates_resolve_in_device_zone() {
        let json = r#"{
            "id": "bday",
            "summary": "Grandma's birthday",
            "start": { "date": "2024-03-15" },
            "end": { "date": "2024-03-16" }
        }"#;
        let event: ApiEvent = serde_json::from_str(json).unwrap();
        let converted = client("Europe/Paris").convert_event(event).unwrap();

        assert!(converted.is_all_day());
        assert_eq!(
            converted.start(),
            Utc.with_ymd_and_hms(2024, 3, 14, 23, 0, 0).unwrap()
        );
        assert_eq!(converted.end() - converted.start(), Duration::days(1));
    }

    #[test]
    fn cancelled_and_broken_events_are_skipped() {
        let client = client("UTC");

        let cancelled: ApiEvent = serde_json::from_str(
            r#"{"id":"x","status":"cancelled","start":{},"end":{}}"#,
        )
        .unwrap();
        assert!(client.convert_event(cancelled).is_none());

        let no_id: ApiEvent = serde_json::from_str(
            r#"{"start":{"dateTime":"2024-03-15T10:00:00Z"},"end":{"dateTime":"2024-03-15T11:00:00Z"}}"#,
        )
        .unwrap();
        assert!(client.convert_event(no_id).is_none());

        let bad_time: ApiEvent = serde_json::from_str(
            r#"{"id":"y","start":{"dateTime":"tomorrow"},"end":{"dateTime":"2024-03-15T11:00:00Z"}}"#,
        )
        .unwrap();
        assert!(client.convert_event(bad_time).is_none());
    }

    #[test]
    fn untitled_event_gets_empty_title() {
        let event: ApiEvent = serde_json::from_str(
            r#"{"id":"z","start":{"dateTime":"2024-03-15T10:00:00Z"},"end":{"dateTime":"2024-03-15T11:00:00Z"}}"#,
        )
        .unwrap();
        let converted = client("UTC").convert_event(event).unwrap();
        assert_eq!(converted.title(), "");
        assert!(!converted.is_config_event());
    }

    #[test]
    fn parse_calendar_list() {
        let json = r#"{
            "items": [
                { "id": "me@example.com", "summary": "me@example.com", "primary": true, "timeZone": "Europe/Paris" },
                { "id": "family@group.calendar.google.com", "summary": "Family", "summaryOverride": "Home" }
            ]
        }"#;
        let list: CalendarListResponse = serde_json::from_str(json).unwrap();
        let calendars: Vec<CalendarInfo> = list.items.into_iter().map(CalendarInfo::from).collect();

        assert_eq!(calendars.len(), 2);
        assert!(calendars[0].is_primary);
        assert_eq!(calendars[0].timezone.as_deref(), Some("Europe/Paris"));
        assert_eq!(calendars[1].name, "Home");
        assert!(!calendars[1].is_primary);
    }

    #[test]
    fn status_mapping() {
        use reqwest::StatusCode;

        let code = |status| status_error(status, "", None).code();
        assert_eq!(code(StatusCode::UNAUTHORIZED), ProviderErrorCode::AuthenticationFailed);
        assert_eq!(code(StatusCode::FORBIDDEN), ProviderErrorCode::AuthorizationFailed);
        assert_eq!(code(StatusCode::NOT_FOUND), ProviderErrorCode::NotFound);
        assert_eq!(code(StatusCode::TOO_MANY_REQUESTS), ProviderErrorCode::RateLimited);
        assert_eq!(code(StatusCode::BAD_GATEWAY), ProviderErrorCode::ServerError);

        let err = status_error(StatusCode::TOO_MANY_REQUESTS, "", Some(30));
        assert_eq!(err.message(), "rate limit exceeded, retry after 30 seconds");
    }

    #[tokio::test]
    async fn missing_token_is_an_auth_failure() {
        let err = client("UTC").access_token().await.unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn expired_token_without_refresh_is_an_auth_failure() {
        let store = Arc::new(MemoryCredentialStore::new().with_token(
            StoredToken::new("old").expiring_in(Utc::now() - Duration::hours(2), Some(3600)),
        ));
        let client = GoogleCalendarClient::new(GoogleConfig::new(), store).unwrap();
        let err = client.access_token().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
    }

    #[tokio::test]
    async fn valid_token_is_returned_as_is() {
        let store = Arc::new(MemoryCredentialStore::new().with_token(
            StoredToken::new("ya29.live").expiring_in(Utc::now(), Some(3600)),
        ));
        let client = GoogleCalendarClient::new(GoogleConfig::new(), store).unwrap();
        assert_eq!(client.access_token().await.unwrap(), "ya29.live");
    }
}
