//! Storage key constants.

/// Retention horizon for the remembered identifier and the credential
/// registry, in days. Independent of session token lifetimes.
pub const REMEMBER_TTL_DAYS: i64 = 400;

/// Logical storage keys used by the engine.
///
/// Adapters may map these onto medium-specific names (cookie names, file
/// document fields); the engine only ever addresses them through here.
pub struct StorageKeys;

impl StorageKeys {
    /// Access token (session-scoped)
    pub const ACCESS_TOKEN: &'static str = "latchkey_access_token";

    /// Refresh token (session-scoped)
    pub const REFRESH_TOKEN: &'static str = "latchkey_refresh_token";

    /// CSRF token (session-scoped, proxy-mode hosts)
    pub const CSRF_TOKEN: &'static str = "latchkey_csrf_token";

    /// Last identifier that signed in successfully (~400 day retention)
    pub const REMEMBERED_IDENTIFIER: &'static str = "latchkey_remembered_identifier";

    /// Per-user credential-id registry, JSON (~400 day retention)
    pub const CREDENTIAL_REGISTRY: &'static str = "latchkey_credential_registry";
}
