//! Client configuration.
//!
//! All settings live in `~/.config/hearth/config.toml` by default. A missing
//! file means defaults; a malformed one is an error.
//!
//! ```toml
//! [sync]
//! interval_secs = 300
//! horizon_days = 1
//! retention_days = 0
//! timezone = "Europe/Paris"
//!
//! [storage]
//! database_path = "/var/lib/hearth/events.db"
//!
//! [google]
//! client_id = "env::HEARTH_GOOGLE_CLIENT_ID"
//! client_secret = "env::HEARTH_GOOGLE_CLIENT_SECRET"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use hearth_core::DeviceZone;
use hearth_server::{SchedulerConfig, SyncConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Configuration for the `hearth` binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub sync: SyncSettings,
    pub storage: StorageSettings,
    #[cfg(feature = "google")]
    pub google: GoogleSettings,
}

/// `[sync]`: schedule and day window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds between scheduled syncs.
    pub interval_secs: u64,
    /// Days fetched ahead, starting at local midnight.
    pub horizon_days: u32,
    /// Days before local midnight that cached rows are kept.
    pub retention_days: u32,
    /// IANA zone name, or `local` for the host zone.
    pub timezone: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            horizon_days: 1,
            retention_days: 0,
            timezone: "local".to_string(),
        }
    }
}

impl SyncSettings {
    pub fn zone(&self) -> ClientResult<DeviceZone> {
        Ok(self.timezone.parse()?)
    }

    pub fn to_sync_config(&self) -> ClientResult<SyncConfig> {
        if self.horizon_days == 0 {
            return Err(ClientError::Config(
                "sync.horizon_days must be at least 1".to_string(),
            ));
        }
        Ok(SyncConfig::new(self.zone()?)
            .with_fetch_horizon(chrono::Duration::days(i64::from(self.horizon_days)))
            .with_retention_offset(chrono::Duration::days(i64::from(self.retention_days))))
    }

    pub fn to_scheduler_config(&self) -> ClientResult<SchedulerConfig> {
        if self.interval_secs < 30 {
            return Err(ClientError::Config(
                "sync.interval_secs must be at least 30".to_string(),
            ));
        }
        Ok(SchedulerConfig::new(Duration::from_secs(self.interval_secs)))
    }
}

/// `[storage]`: where the cache and credentials live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_path: Option<PathBuf>,
    pub credentials_path: Option<PathBuf>,
}

impl StorageSettings {
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| ClientConfig::default_data_dir().join("events.db"))
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_path
            .clone()
            .unwrap_or_else(|| ClientConfig::default_config_dir().join("credentials.json"))
    }
}

impl ClientConfig {
    /// Loads from the default path, or defaults if the file does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads from a specific path. The file must exist.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("failed to parse config: {}", e))
    }

    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hearth")
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hearth")
    }
}

/// `[google]`: OAuth client and HTTP settings.
///
/// `client_id` and `client_secret` accept `env::` references. Both are only
/// needed to refresh expired access tokens.
#[cfg(feature = "google")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub timeout_secs: u64,
}

#[cfg(feature = "google")]
impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            timeout_secs: hearth_providers::google::GoogleConfig::DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[cfg(feature = "google")]
impl GoogleSettings {
    /// Builds the provider configuration, resolving secret references.
    pub fn to_provider_config(
        &self,
        zone: DeviceZone,
    ) -> ClientResult<hearth_providers::google::GoogleConfig> {
        use hearth_providers::google::{GoogleConfig, OAuthCredentials};

        let mut config = GoogleConfig::new()
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_zone(zone);

        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) => {
                let id = crate::secret::resolve(id)
                    .map_err(|e| ClientError::Config(format!("google.client_id: {}", e)))?;
                let secret = crate::secret::resolve(secret)
                    .map_err(|e| ClientError::Config(format!("google.client_secret: {}", e)))?;
                config = config.with_credentials(OAuthCredentials::new(id, secret));
            }
            (None, None) => {}
            _ => {
                return Err(ClientError::Config(
                    "google.client_id and google.client_secret must be set together".to_string(),
                ));
            }
        }

        config.validate().map_err(ClientError::Config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = ClientConfig::parse("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.sync.interval_secs, 300);
        assert_eq!(config.sync.zone().unwrap(), DeviceZone::Local);
    }

    #[test]
    fn parses_all_sections() {
        let config = ClientConfig::parse(
            r#"
            [sync]
            interval_secs = 120
            horizon_days = 7
            retention_days = 1
            timezone = "Europe/Paris"

            [storage]
            database_path = "/var/lib/hearth/events.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.interval_secs, 120);
        assert_eq!(
            config.storage.database_path(),
            PathBuf::from("/var/lib/hearth/events.db")
        );
        assert!(config.storage.credentials_path().ends_with("hearth/credentials.json"));

        let sync = config.sync.to_sync_config().unwrap();
        assert_eq!(sync.fetch_horizon(), chrono::Duration::days(7));
        assert_eq!(sync.retention_offset(), chrono::Duration::days(1));
        assert_eq!(sync.zone().to_string(), "Europe/Paris");

        let scheduler = config.sync.to_scheduler_config().unwrap();
        assert_eq!(scheduler.sync_interval, Duration::from_secs(120));
    }

    #[test]
    fn rejects_bad_values() {
        let bad_zone = SyncSettings {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..Default::default()
        };
        assert!(bad_zone.to_sync_config().is_err());

        let no_horizon = SyncSettings {
            horizon_days: 0,
            ..Default::default()
        };
        assert!(no_horizon.to_sync_config().is_err());

        let too_often = SyncSettings {
            interval_secs: 5,
            ..Default::default()
        };
        assert!(too_often.to_scheduler_config().is_err());

        assert!(ClientConfig::parse("[sync]\ninterval_secs = \"often\"").is_err());
    }

    #[test]
    fn load_from_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[cfg(feature = "google")]
    #[test]
    fn google_credentials_resolve_env_refs() {
        unsafe {
            std::env::set_var("_HEARTH_TEST_CLIENT_SECRET", "s3cret");
        }
        let config = ClientConfig::parse(
            r#"
            [google]
            client_id = "1234.apps.googleusercontent.com"
            client_secret = "env::_HEARTH_TEST_CLIENT_SECRET"
            timeout_secs = 10
            "#,
        )
        .unwrap();

        let provider = config.google.to_provider_config(DeviceZone::Local).unwrap();
        let credentials = provider.credentials.unwrap();
        assert_eq!(credentials.client_secret, "s3cret");
        assert_eq!(provider.timeout, Duration::from_secs(10));
        unsafe {
            std::env::remove_var("_HEARTH_TEST_CLIENT_SECRET");
        }
    }

    #[cfg(feature = "google")]
    #[test]
    fn google_credentials_must_come_in_pairs() {
        let settings = GoogleSettings {
            client_id: Some("1234.apps.googleusercontent.com".to_string()),
            ..Default::default()
        };
        assert!(settings.to_provider_config(DeviceZone::Local).is_err());

        let settings = GoogleSettings::default();
        let provider = settings.to_provider_config(DeviceZone::Local).unwrap();
        assert!(provider.credentials.is_none());
    }
}
