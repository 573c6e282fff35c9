//! Server endpoint paths and wire shapes.
//!
//! The engine consumes a fixed REST surface under `/v1/apps/{app_id}`;
//! everything else about the server is out of scope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Endpoint path builder for one application.
#[derive(Debug, Clone)]
pub struct Endpoints {
    app_id: String,
}

impl Endpoints {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
        }
    }

    fn base(&self) -> String {
        format!("/v1/apps/{}", self.app_id)
    }

    /// App metadata (enabled auth methods, display configuration).
    pub fn app_metadata(&self) -> String {
        self.base()
    }

    /// Lookup a user by identifier (email/phone).
    pub fn user_lookup(&self, identifier: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(identifier.as_bytes()).collect();
        format!("{}/users/lookup/{}", self.base(), encoded)
    }

    pub fn user(&self, user_id: &str) -> String {
        format!("{}/users/{}", self.base(), user_id)
    }

    pub fn magic_link_send(&self) -> String {
        format!("{}/auth/magic-links", self.base())
    }

    pub fn magic_link_status(&self, id: &str) -> String {
        format!("{}/auth/magic-links/{}/status", self.base(), id)
    }

    pub fn magic_link_verify(&self) -> String {
        format!("{}/auth/magic-links/verify", self.base())
    }

    pub fn otp_send(&self) -> String {
        format!("{}/auth/otp", self.base())
    }

    pub fn otp_verify(&self) -> String {
        format!("{}/auth/otp/verify", self.base())
    }

    pub fn webauthn_register_init(&self) -> String {
        format!("{}/auth/webauthn/register", self.base())
    }

    pub fn webauthn_register_finalize(&self) -> String {
        format!("{}/auth/webauthn/register/finalize", self.base())
    }

    pub fn webauthn_assert_init(&self) -> String {
        format!("{}/auth/webauthn/assert", self.base())
    }

    pub fn webauthn_assert_finalize(&self) -> String {
        format!("{}/auth/webauthn/assert/finalize", self.base())
    }

    /// Token refresh.
    pub fn tokens(&self) -> String {
        format!("{}/auth/tokens", self.base())
    }

    /// Current-user fetch (session validation).
    pub fn me(&self) -> String {
        format!("{}/auth/me", self.base())
    }

    pub fn sign_out(&self) -> String {
        format!("{}/auth/sign-out", self.base())
    }
}

/// User record returned by identifier lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLookup {
    pub id: String,
    pub identifier: String,
    /// Whether the user has device-credential sign-in enabled.
    #[serde(default)]
    pub webauthn_enabled: bool,
    /// Credential ids the server would offer in an assertion ceremony.
    #[serde(default)]
    pub credential_ids: Vec<String>,
}

/// App metadata consumed at engine start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    #[serde(default)]
    pub magic_link: bool,
    #[serde(default)]
    pub otp: bool,
    #[serde(default)]
    pub webauthn: bool,
    /// Opaque display/theme blob for presentation layers.
    #[serde(default)]
    pub display: Value,
}
