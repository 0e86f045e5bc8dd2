//! Credential persistence
//!
//! The persisted state is a small key/value record: `access_token`, `user`
//! (serialized identity) and `last_active`. `FileCredentialStore` keeps it in
//! `~/.local/share/shopchat/credentials.json` with 0600 permissions.

use super::{Credentials, Identity};
use crate::config::AuthConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Persists access token and identity across restarts
///
/// `save` is all-or-nothing: incomplete credentials are ignored. `load`
/// never fails; unreadable state is reported as absent.
pub trait CredentialStore: Send + Sync {
    fn save(&self, credentials: &Credentials);

    fn load(&self) -> Option<Credentials>;

    /// Remove every persisted field. Idempotent.
    fn clear(&self);

    /// Record the "last active session" timestamp
    fn mark_active(&self, at: DateTime<Utc>);

    fn last_active(&self) -> Option<DateTime<Utc>>;
}

/// On-disk record format with version for future migrations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_active: Option<DateTime<Utc>>,
}

impl StoredRecord {
    const VERSION: u32 = 1;

    fn credentials(&self) -> Option<Credentials> {
        let token = self.access_token.as_ref().filter(|t| !t.trim().is_empty())?;
        let user = self.user.as_ref().filter(|u| !u.is_empty())?;
        Some(Credentials {
            access_token: token.clone(),
            user_id: user.user_id.clone(),
            username: user.username.clone(),
        })
    }

    fn set_credentials(&mut self, credentials: &Credentials) {
        self.version = Self::VERSION;
        self.access_token = Some(credentials.access_token.clone());
        self.user = Some(credentials.identity());
    }
}

/// File-backed store
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `auth.credentials_path`, else the platform data directory
    pub fn for_config(auth: &AuthConfig) -> anyhow::Result<Self> {
        match &auth.credentials_path {
            Some(path) => Ok(Self::new(path.clone())),
            None => Ok(Self::new(Self::default_path()?)),
        }
    }

    pub fn default_path() -> anyhow::Result<PathBuf> {
        use anyhow::Context;

        let data_dir = dirs::data_local_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .context("Failed to determine data directory")?;

        Ok(data_dir.join("shopchat").join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_record(&self) -> Option<StoredRecord> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read credentials {:?}: {}", self.path, e);
                return None;
            }
        };

        match serde_json::from_str::<StoredRecord>(&content) {
            Ok(record) if record.version > StoredRecord::VERSION => {
                tracing::warn!(
                    "Credential file version {} is newer than supported version {}",
                    record.version,
                    StoredRecord::VERSION
                );
                None
            }
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Ignoring unparseable credentials {:?}: {}", self.path, e);
                None
            }
        }
    }

    fn write_record(&self, record: &StoredRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(record)?;

        // Write to temp file first, then rename (atomic)
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&temp_path, &self.path)
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&self, credentials: &Credentials) {
        if !credentials.is_complete() {
            tracing::debug!("Refusing to persist incomplete credentials");
            return;
        }

        let mut record = self.read_record().unwrap_or_default();
        record.set_credentials(credentials);

        match self.write_record(&record) {
            Ok(()) => tracing::debug!("Saved credentials to {:?}", self.path),
            Err(e) => tracing::warn!("Failed to save credentials to {:?}: {}", self.path, e),
        }
    }

    fn load(&self) -> Option<Credentials> {
        self.read_record()?.credentials()
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::info!("Cleared stored credentials {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to clear credentials {:?}: {}", self.path, e),
        }
    }

    fn mark_active(&self, at: DateTime<Utc>) {
        // Only touch an existing record; activity alone is not worth a file
        let Some(mut record) = self.read_record() else {
            return;
        };
        record.last_active = Some(at);
        if let Err(e) = self.write_record(&record) {
            tracing::warn!("Failed to record activity in {:?}: {}", self.path, e);
        }
    }

    fn last_active(&self) -> Option<DateTime<Utc>> {
        self.read_record()?.last_active
    }
}

/// In-process store for embedding and tests
#[derive(Default)]
pub struct MemoryCredentialStore {
    record: Mutex<StoredRecord>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with credentials (as if saved by an earlier run)
    pub fn with_credentials(credentials: &Credentials) -> Self {
        let store = Self::new();
        store.save(credentials);
        store
    }

    fn record(&self) -> MutexGuard<'_, StoredRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, credentials: &Credentials) {
        if credentials.is_complete() {
            self.record().set_credentials(credentials);
        }
    }

    fn load(&self) -> Option<Credentials> {
        self.record().credentials()
    }

    fn clear(&self) {
        *self.record() = StoredRecord::default();
    }

    fn mark_active(&self, at: DateTime<Utc>) {
        self.record().last_active = Some(at);
    }

    fn last_active(&self) -> Option<DateTime<Utc>> {
        self.record().last_active
    }
}
