//! Storage trait definitions.

use crate::{StorageAttributes, StorageResult};
use async_trait::async_trait;

/// Contract every storage adapter satisfies.
///
/// All operations are asynchronous: some backing media (cookie jars bridged
/// to a host response, files) genuinely suspend, and the engine treats every
/// storage call as a suspension point.
///
/// `attrs` carry expiry/path/same-site flags understood only by cookie-backed
/// implementations; other adapters ignore the fields they don't support
/// rather than erroring.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Retrieve a value.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store a value.
    async fn set(
        &self,
        key: &str,
        value: &str,
        attrs: Option<&StorageAttributes>,
    ) -> StorageResult<()>;

    /// Delete a value.
    async fn remove(&self, key: &str, attrs: Option<&StorageAttributes>) -> StorageResult<()>;

    /// Check if a key exists.
    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
