//! Typed attribute bag for storage writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// SameSite policy for cookie-backed adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Optional attributes attached to a storage write.
///
/// Cookie-backed adapters render these into cookie attribute pairs; other
/// adapters honor `expires`/`max_age` where they can (file store) and ignore
/// the rest. Unknown-to-the-adapter fields are never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageAttributes {
    /// Absolute expiry instant.
    pub expires: Option<DateTime<Utc>>,
    /// Relative lifetime; takes precedence over `expires` when both are set.
    pub max_age: Option<Duration>,
    /// Cookie path.
    pub path: Option<String>,
    /// SameSite policy.
    pub same_site: Option<SameSite>,
    /// Secure flag.
    pub secure: bool,
    /// HttpOnly-like flag.
    pub http_only: bool,
}

impl StorageAttributes {
    /// Attributes for long-retention keys (remembered identifier,
    /// credential registry).
    pub fn long_lived(days: i64) -> Self {
        Self {
            max_age: Some(Duration::from_secs((days as u64) * 24 * 60 * 60)),
            path: Some("/".to_string()),
            same_site: Some(SameSite::Lax),
            secure: true,
            ..Self::default()
        }
    }

    /// Resolve the effective expiry deadline, if any.
    pub fn deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if let Some(max_age) = self.max_age {
            return chrono::Duration::from_std(max_age).ok().map(|d| now + d);
        }
        self.expires
    }
}
