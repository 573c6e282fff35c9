//! Passwordless authentication client engine.
//!
//! The engine keeps a user signed in without passwords: magic links, one-time
//! codes, and platform device credentials, backed by a short-lived access
//! token that is refreshed proactively in the background.
//!
//! [`AuthClient`] is the entry point. It owns the session manager (token
//! lifecycle, single-flight refresh, visibility-gated refresh ticker), the
//! device credential registry, the ceremony adapter seam, the auth-state
//! event stream, and the cross-context broadcast synchronizer. Hosts plug
//! in storage ([`latchkey_storage::TokenStore`]), a credential adapter
//! ([`CredentialAdapter`]), and a broadcast channel
//! ([`latchkey_broadcast::SessionChannel`]); everything has a working
//! default.
//!
//! ```no_run
//! use latchkey_engine::{AuthClient, EngineConfig, SignInOutcome};
//!
//! # async fn run() -> Result<(), latchkey_engine::AuthError> {
//! let client = AuthClient::new(EngineConfig::new(
//!     "https://api.latchkey.dev",
//!     "app_123",
//!     "pk_live_abc",
//! ));
//! client.start().await?;
//!
//! match client.sign_in_or_up("user@example.com").await? {
//!     SignInOutcome::SignedIn(session) => drop(session),
//!     SignInOutcome::MagicPending(link) => drop(link.id),
//!     SignInOutcome::DeviceRegistrationRequired(payload) => {
//!         client.sign_in_with_register_device(&payload).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod ceremony;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod magic;
pub mod registry;
pub mod session;
pub mod sync;
#[cfg(test)]
pub(crate) mod testutil;
pub mod token;

pub use api::{AppMetadata, Endpoints, UserLookup};
pub use ceremony::{
    map_platform_exception, CeremonyFailure, CeremonyOutput, CredentialAdapter, UnsupportedAdapter,
};
pub use client::{AuthClient, AuthClientBuilder, SignInOutcome};
pub use config::EngineConfig;
pub use error::{classify, AuthError, AuthResult, CeremonyCode, Classified, DomainCode};
pub use events::{AuthEvent, EventCallback, EventEmitter, Subscription};
pub use magic::{MagicLinkFlow, MagicLinkStatus, PendingMagicLink};
pub use registry::CredentialRegistry;
pub use session::{Session, SessionManager, TokenPayload};
pub use sync::BroadcastSync;
