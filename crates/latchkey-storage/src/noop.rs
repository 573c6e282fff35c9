//! No-op storage adapter.

use crate::{StorageAttributes, StorageResult, TokenStore};
use async_trait::async_trait;

/// Adapter for hosts with persistence explicitly disabled.
///
/// Reads always miss and writes succeed silently, so the engine keeps its
/// session purely in memory without special-casing the configuration.
#[derive(Default, Clone, Copy)]
pub struct NoopStore;

impl NoopStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TokenStore for NoopStore {
    async fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: &str,
        _attrs: Option<&StorageAttributes>,
    ) -> StorageResult<()> {
        Ok(())
    }

    async fn remove(&self, _key: &str, _attrs: Option<&StorageAttributes>) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_store_never_persists() {
        let store = NoopStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.remove("k", None).await.unwrap();
    }
}
