//! Device credential ceremonies.
//!
//! The engine never talks to an authenticator directly; hosts plug in a
//! [`CredentialAdapter`] that runs the platform's register/assert
//! ceremonies. Adapter failures arrive as platform exception names plus a
//! message and are mapped here onto the engine's ceremony codes.

use crate::error::CeremonyCode;
use async_trait::async_trait;
use serde_json::Value;

/// A ceremony failure as reported by the platform layer.
#[derive(Debug, Clone)]
pub struct CeremonyFailure {
    /// Platform exception name, e.g. `AbortError` or `NotAllowedError`.
    pub exception: String,
    pub message: String,
}

impl CeremonyFailure {
    pub fn new(exception: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exception: exception.into(),
            message: message.into(),
        }
    }
}

/// Result of a successful ceremony.
#[derive(Debug, Clone)]
pub struct CeremonyOutput {
    /// The credential id the authenticator used or created.
    pub credential_id: String,
    /// Platform attestation/assertion response, forwarded to the server.
    pub response: Value,
}

/// Host-provided bridge to the platform's credential APIs.
#[async_trait]
pub trait CredentialAdapter: Send + Sync {
    /// Whether the platform can run ceremonies at all.
    fn is_supported(&self) -> bool;

    /// Run a registration (attestation) ceremony from server options.
    async fn register(&self, options: &Value) -> Result<CeremonyOutput, CeremonyFailure>;

    /// Run an assertion ceremony from server options.
    async fn assert(&self, options: &Value) -> Result<CeremonyOutput, CeremonyFailure>;
}

/// Map a platform exception name (and its message, which disambiguates a
/// few overloaded names) onto a ceremony code.
pub fn map_platform_exception(failure: &CeremonyFailure) -> CeremonyCode {
    let message = failure.message.to_lowercase();
    match failure.exception.as_str() {
        "AbortError" => CeremonyCode::Aborted,
        // SecurityError covers both an origin/domain mismatch and a bad
        // relying-party id; only the message tells them apart.
        "SecurityError" => {
            if message.contains("relying") {
                CeremonyCode::InvalidRpId
            } else {
                CeremonyCode::InvalidDomain
            }
        }
        "TypeError" => CeremonyCode::MalformedPubKeyAlgorithms,
        "ConstraintError" => {
            if message.contains("discoverable") || message.contains("resident") {
                CeremonyCode::MissingDiscoverableSupport
            } else {
                CeremonyCode::MissingUserVerificationSupport
            }
        }
        "InvalidStateError" => CeremonyCode::AlreadyRegistered,
        "NotSupportedError" => CeremonyCode::NoSupportedAlgorithm,
        "NotAllowedError" => CeremonyCode::NotAllowed,
        "UnsupportedPlatform" => CeremonyCode::Unsupported,
        _ => CeremonyCode::AuthenticatorFailure,
    }
}

/// Adapter for hosts without credential support; `is_supported` is false
/// and any ceremony fails with an unsupported-platform error.
pub struct UnsupportedAdapter;

#[async_trait]
impl CredentialAdapter for UnsupportedAdapter {
    fn is_supported(&self) -> bool {
        false
    }

    async fn register(&self, _options: &Value) -> Result<CeremonyOutput, CeremonyFailure> {
        Err(CeremonyFailure::new(
            "UnsupportedPlatform",
            "credential ceremonies are not supported on this host",
        ))
    }

    async fn assert(&self, _options: &Value) -> Result<CeremonyOutput, CeremonyFailure> {
        Err(CeremonyFailure::new(
            "UnsupportedPlatform",
            "credential ceremonies are not supported on this host",
        ))
    }
}
