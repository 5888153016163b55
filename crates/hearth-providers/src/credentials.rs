//! Credential store capability.
//!
//! The kiosk keeps a handful of secrets and bookkeeping values outside the
//! event cache: the OAuth token pair, which calendar the household picked, and
//! when the last sync succeeded. [`CredentialStore`] is the seam; how the
//! values are secured is up to the implementation.
//!
//! - [`FileCredentialStore`] persists a JSON document with `0600` permissions,
//!   written via temp file and rename. Several processes may share the file:
//!   every read goes back to disk and every write is a read-modify-write
//!   under an advisory lock.
//! - [`MemoryCredentialStore`] keeps everything in memory

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from reading or writing credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credentials from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write credentials to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to lock credentials at {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credentials file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type CredentialResult<T> = Result<T, CredentialError>;

/// An OAuth bearer token with its optional refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted, if known.
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the expiry from an OAuth `expires_in` value.
    ///
    /// A minute is shaved off so the token is refreshed before the remote
    /// starts rejecting it.
    #[must_use]
    pub fn expiring_in(mut self, now: DateTime<Utc>, expires_in_secs: Option<i64>) -> Self {
        self.expires_at =
            expires_in_secs.map(|secs| now + Duration::seconds(secs) - Duration::seconds(60));
        self
    }

    /// Returns true if the access token is expired at `now`.
    ///
    /// Tokens without a known expiry are assumed valid.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Replaces the access token after a refresh, keeping the refresh token.
    #[must_use]
    pub fn refreshed(
        &self,
        access_token: impl Into<String>,
        now: DateTime<Utc>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: self.refresh_token.clone(),
            expires_at: None,
        }
        .expiring_in(now, expires_in_secs)
    }
}

/// Persistent key-value store for the kiosk's credentials and sync state.
///
/// Reads are infallible: an implementation that cannot reach its backing
/// storage serves the last state it saw. Writes persist before returning.
pub trait CredentialStore: Send + Sync {
    /// The calendar the household picked, if any.
    fn selected_calendar_id(&self) -> Option<String>;

    /// Sets or clears the selected calendar.
    fn set_selected_calendar_id(&self, calendar_id: Option<&str>) -> CredentialResult<()>;

    /// When the last sync succeeded; `None` if never.
    fn last_sync_time(&self) -> Option<DateTime<Utc>>;

    /// Records the last successful sync; `None` resets to never.
    fn set_last_sync_time(&self, at: Option<DateTime<Utc>>) -> CredentialResult<()>;

    /// Moves the last sync time forward to `at`, never backwards.
    ///
    /// The comparison and the write happen atomically, so concurrent callers
    /// cannot rewind each other. Returns the stored value.
    fn advance_last_sync_time(&self, at: DateTime<Utc>) -> CredentialResult<DateTime<Utc>>;

    fn token(&self) -> Option<StoredToken>;

    fn set_token(&self, token: Option<StoredToken>) -> CredentialResult<()>;
}

/// The persisted document.
///
/// `last_sync_ms` is epoch milliseconds with `0` meaning never.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct CredentialDocument {
    selected_calendar_id: Option<String>,
    last_sync_ms: i64,
    token: Option<StoredToken>,
}

impl CredentialDocument {
    fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        if self.last_sync_ms == 0 {
            return None;
        }
        DateTime::from_timestamp_millis(self.last_sync_ms)
    }

    fn set_last_sync_time(&mut self, at: Option<DateTime<Utc>>) {
        self.last_sync_ms = at.map_or(0, |at| at.timestamp_millis());
    }

    fn advance_last_sync_time(&mut self, at: DateTime<Utc>) -> DateTime<Utc> {
        let next = self.last_sync_time().map_or(at, |prev| prev.max(at));
        self.set_last_sync_time(Some(next));
        self.last_sync_time().unwrap_or(next)
    }
}

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    doc: RwLock<CredentialDocument>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: start with a calendar already selected.
    #[must_use]
    pub fn with_calendar(self, calendar_id: impl Into<String>) -> Self {
        self.write().selected_calendar_id = Some(calendar_id.into());
        self
    }

    /// Builder: start with a token.
    #[must_use]
    pub fn with_token(self, token: StoredToken) -> Self {
        self.write().token = Some(token);
        self
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CredentialDocument> {
        self.doc.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CredentialDocument> {
        self.doc.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn selected_calendar_id(&self) -> Option<String> {
        self.read().selected_calendar_id.clone()
    }

    fn set_selected_calendar_id(&self, calendar_id: Option<&str>) -> CredentialResult<()> {
        self.write().selected_calendar_id = calendar_id.map(str::to_string);
        Ok(())
    }

    fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.read().last_sync_time()
    }

    fn set_last_sync_time(&self, at: Option<DateTime<Utc>>) -> CredentialResult<()> {
        self.write().set_last_sync_time(at);
        Ok(())
    }

    fn advance_last_sync_time(&self, at: DateTime<Utc>) -> CredentialResult<DateTime<Utc>> {
        Ok(self.write().advance_last_sync_time(at))
    }

    fn token(&self) -> Option<StoredToken> {
        self.read().token.clone()
    }

    fn set_token(&self, token: Option<StoredToken>) -> CredentialResult<()> {
        self.write().token = token;
        Ok(())
    }
}

/// Credential store backed by a JSON file.
///
/// The daemon and one-shot commands open the same file from different
/// processes, so nothing is trusted from memory: reads reload the document
/// and writes reload it again under `<file>.lock` before applying a change.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    /// Last document seen on disk, served when a reload fails.
    doc: RwLock<CredentialDocument>,
}

impl FileCredentialStore {
    /// Opens the store, loading the file if it exists.
    pub fn open(path: impl Into<PathBuf>) -> CredentialResult<Self> {
        let path = path.into();
        let doc = match load(&path)? {
            Some(doc) => {
                info!("loaded credentials from {:?}", path);
                doc
            }
            None => {
                debug!("no credentials file at {:?}", path);
                CredentialDocument::default()
            }
        };

        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current document on disk.
    fn current(&self) -> CredentialDocument {
        match load(&self.path) {
            Ok(doc) => {
                let doc = doc.unwrap_or_default();
                let mut cached = self.doc.write().unwrap_or_else(PoisonError::into_inner);
                cached.clone_from(&doc);
                doc
            }
            Err(e) => {
                warn!(error = %e, "serving cached credentials");
                self.doc
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            }
        }
    }

    /// Reloads the document, applies `change`, and persists the result while
    /// holding the file lock.
    ///
    /// A document that cannot be read is an error rather than something to
    /// overwrite.
    fn update<T>(&self, change: impl FnOnce(&mut CredentialDocument) -> T) -> CredentialResult<T> {
        let mut cached = self.doc.write().unwrap_or_else(PoisonError::into_inner);
        let _lock = self.lock()?;

        let mut next = load(&self.path)?.unwrap_or_default();
        let out = change(&mut next);
        self.persist(&next)?;
        *cached = next;
        Ok(out)
    }

    /// Takes the exclusive advisory lock; released when the file is dropped.
    fn lock(&self) -> CredentialResult<File> {
        let path = self.path.with_extension("json.lock");
        let lock_err = |source| CredentialError::Lock {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;
        Ok(file)
    }

    fn persist(&self, doc: &CredentialDocument) -> CredentialResult<()> {
        let write_err = |source| CredentialError::Write {
            path: self.path.clone(),
            source,
        };

        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| write_err(std::io::Error::other(e)))?;

        // Left behind by a writer that died mid-save.
        let temp_path = self.path.with_extension("json.tmp");
        match fs::remove_file(&temp_path) {
            Ok(()) => debug!("removed stale {:?}", temp_path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(write_err(e)),
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&temp_path).map_err(write_err)?;
        file.write_all(content.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(write_err)?;
        debug!("saved credentials to {:?}", self.path);
        Ok(())
    }
}

/// Reads the document at `path`; `None` if there is no file yet.
fn load(path: &Path) -> CredentialResult<Option<CredentialDocument>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CredentialError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| CredentialError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

impl CredentialStore for FileCredentialStore {
    fn selected_calendar_id(&self) -> Option<String> {
        self.current().selected_calendar_id
    }

    fn set_selected_calendar_id(&self, calendar_id: Option<&str>) -> CredentialResult<()> {
        let calendar_id = calendar_id.map(str::to_string);
        self.update(|doc| doc.selected_calendar_id = calendar_id)
    }

    fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.current().last_sync_time()
    }

    fn set_last_sync_time(&self, at: Option<DateTime<Utc>>) -> CredentialResult<()> {
        self.update(|doc| doc.set_last_sync_time(at))
    }

    fn advance_last_sync_time(&self, at: DateTime<Utc>) -> CredentialResult<DateTime<Utc>> {
        self.update(|doc| doc.advance_last_sync_time(at))
    }

    fn token(&self) -> Option<StoredToken> {
        self.current().token
    }

    fn set_token(&self, token: Option<StoredToken>) -> CredentialResult<()> {
        self.update(|doc| doc.token = token)
    }
}
