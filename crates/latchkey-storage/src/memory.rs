//! In-memory storage adapter.

use crate::{StorageAttributes, StorageResult, TokenStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Ephemeral storage backed by a `HashMap`.
///
/// Ignores all write attributes. Suitable for tests and for hosts that keep
/// session state purely in-process.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        _attrs: Option<&StorageAttributes>,
    ) -> StorageResult<()> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str, _attrs: Option<&StorageAttributes>) -> StorageResult<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }
}
