//! File-backed storage adapter.

use crate::{StorageAttributes, StorageError, StorageResult, TokenStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

/// One persisted entry with an optional expiry deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Storage backed by a single JSON document on disk.
///
/// Writes are read-modify-write under an async lock; expired entries are
/// evicted lazily on read. `expires`/`max_age` attributes are honored,
/// cookie-only attributes are ignored.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store persisting to `path`. The file is created on first
    /// write; a missing file reads as empty.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> StorageResult<HashMap<String, Entry>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| StorageError::Encoding(format!("corrupt storage document: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, entries: &HashMap<String, Entry>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string(entries)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;

        match entries.get(key) {
            Some(entry) => {
                if let Some(deadline) = entry.expires_at {
                    if deadline <= Utc::now() {
                        debug!(key, "evicting expired storage entry");
                        entries.remove(key);
                        self.persist(&entries).await?;
                        return Ok(None);
                    }
                }
                Ok(Some(entries[key].value.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        attrs: Option<&StorageAttributes>,
    ) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: attrs.and_then(|a| a.deadline(Utc::now())),
            },
        );
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str, _attrs: Option<&StorageAttributes>) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}
