//! Per-session credential persistence.
//!
//! The protocol library owns the credential blob's contents; this store only
//! keeps it on disk keyed by session id so a session survives restarts. The
//! same directory also holds the library's cached sync-state markers, which
//! can be cleared to force a fresh history replay on the next connect.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use tokio::fs;

use crate::store::error::{Result, StoreError};
use crate::store::models::SessionId;

const CREDS_FILE: &str = "creds.json";
/// Files tracking what the network already synced to this device. Deleting
/// them makes the next connect replay full history; credentials are kept.
const SYNC_STATE_PREFIX: &str = "app-state-sync-";

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, session_id: SessionId) -> Result<Option<Vec<u8>>>;
    async fn save(&self, session_id: SessionId, blob: &[u8]) -> Result<()>;
    /// Removes cached sync-state markers, returning how many were cleared.
    async fn clear_sync_state(&self, session_id: SessionId) -> Result<usize>;
    /// Drops everything stored for the session, credentials included.
    async fn purge(&self, session_id: SessionId) -> Result<()>;
}

pub struct FileCredentialStore {
    base_path: PathBuf,
}

impl FileCredentialStore {
    pub async fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let base_path = path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    /// The directory holding everything the protocol library persists for
    /// one session.
    pub fn session_dir(&self, session_id: SessionId) -> PathBuf {
        self.base_path.join(format!("session_{session_id}"))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, session_id: SessionId) -> Result<Option<Vec<u8>>> {
        let path = self.session_dir(session_id).join(CREDS_FILE);
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn save(&self, session_id: SessionId, blob: &[u8]) -> Result<()> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(CREDS_FILE), blob)
            .await
            .map_err(StoreError::Io)
    }

    async fn clear_sync_state(&self, session_id: SessionId) -> Result<usize> {
        let dir = self.session_dir(session_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut cleared = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(SYNC_STATE_PREFIX) {
                fs::remove_file(entry.path()).await?;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn purge(&self, session_id: SessionId) -> Result<()> {
        match fs::remove_dir_all(self.session_dir(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
