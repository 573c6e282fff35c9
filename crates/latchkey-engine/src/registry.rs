//! Device credential registry.
//!
//! Tracks which credential ids have been seen on this device, per user, so
//! the engine can distinguish a returning device from a new one before
//! starting an assertion ceremony. Stored as a JSON map under a single
//! long-lived storage key.

use crate::error::AuthResult;
use latchkey_storage::{StorageAttributes, StorageKeys, TokenStore, REMEMBER_TTL_DAYS};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Per-user credential ids known to this device.
pub struct CredentialRegistry {
    store: Arc<dyn TokenStore>,
}

impl CredentialRegistry {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    async fn load(&self) -> AuthResult<HashMap<String, Vec<String>>> {
        let Some(raw) = self.store.get(StorageKeys::CREDENTIAL_REGISTRY).await? else {
            return Ok(HashMap::new());
        };
        // A corrupt registry is treated as empty rather than wedging every
        // sign-in behind a parse error.
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    async fn save(&self, registry: &HashMap<String, Vec<String>>) -> AuthResult<()> {
        let raw = serde_json::to_string(registry).unwrap_or_else(|_| "{}".to_string());
        self.store
            .set(
                StorageKeys::CREDENTIAL_REGISTRY,
                &raw,
                Some(&StorageAttributes::long_lived(REMEMBER_TTL_DAYS)),
            )
            .await?;
        Ok(())
    }

    /// Whether this device looks new for the user: no credentials recorded,
    /// or none of the server-offered credential ids intersect the recorded
    /// set.
    pub async fn is_new_device(&self, user_id: &str, offered: &[String]) -> AuthResult<bool> {
        let registry = self.load().await?;
        let Some(known) = registry.get(user_id) else {
            return Ok(true);
        };
        if known.is_empty() {
            return Ok(true);
        }
        Ok(!offered.iter().any(|id| known.contains(id)))
    }

    /// Record a credential id for the user. Idempotent.
    pub async fn record(&self, user_id: &str, credential_id: &str) -> AuthResult<()> {
        let mut registry = self.load().await?;
        let known = registry.entry(user_id.to_string()).or_default();
        if !known.iter().any(|id| id == credential_id) {
            known.push(credential_id.to_string());
            debug!(user_id, "credential recorded for device");
            self.save(&registry).await?;
        }
        Ok(())
    }

    /// Forget one recorded credential for the user.
    pub async fn revoke(&self, user_id: &str, credential_id: &str) -> AuthResult<()> {
        let mut registry = self.load().await?;
        let Some(known) = registry.get_mut(user_id) else {
            return Ok(());
        };
        let before = known.len();
        known.retain(|id| id != credential_id);
        if known.len() == before {
            return Ok(());
        }
        if known.is_empty() {
            registry.remove(user_id);
        }
        self.save(&registry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchkey_storage::MemoryStore;

    fn registry() -> CredentialRegistry {
        CredentialRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_unknown_user_is_new_device() {
        let registry = registry();
        assert!(registry
            .is_new_device("user-1", &["cred-a".to_string()])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_recorded_credential_marks_device_known() {
        let registry = registry();
        registry.record("user-1", "cred-a").await.unwrap();

        assert!(!registry
            .is_new_device("user-1", &["cred-a".to_string(), "cred-b".to_string()])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_disjoint_offered_set_is_new_device() {
        let registry = registry();
        registry.record("user-1", "cred-a").await.unwrap();

        assert!(registry
            .is_new_device("user-1", &["cred-x".to_string()])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let registry = registry();
        registry.record("user-1", "cred-a").await.unwrap();
        registry.record("user-1", "cred-a").await.unwrap();

        let loaded = registry.load().await.unwrap();
        assert_eq!(loaded["user-1"], vec!["cred-a".to_string()]);
    }

    #[tokio::test]
    async fn test_revoke_forgets_credential() {
        let registry = registry();
        registry.record("user-1", "cred-a").await.unwrap();
        registry.record("user-1", "cred-b").await.unwrap();
        registry.revoke("user-1", "cred-a").await.unwrap();

        assert!(registry
            .is_new_device("user-1", &["cred-a".to_string()])
            .await
            .unwrap());
        assert!(!registry
            .is_new_device("user-1", &["cred-b".to_string()])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_revoke_last_credential_makes_device_new() {
        let registry = registry();
        registry.record("user-1", "cred-a").await.unwrap();
        registry.revoke("user-1", "cred-a").await.unwrap();

        assert!(registry
            .is_new_device("user-1", &["cred-a".to_string()])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_registry_is_per_user() {
        let registry = registry();
        registry.record("user-1", "cred-a").await.unwrap();

        assert!(registry
            .is_new_device("user-2", &["cred-a".to_string()])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_registry_treated_as_empty() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(StorageKeys::CREDENTIAL_REGISTRY, "not json", None)
            .await
            .unwrap();

        let registry = CredentialRegistry::new(store);
        assert!(registry
            .is_new_device("user-1", &["cred-a".to_string()])
            .await
            .unwrap());
    }
}
