//! Authentication error taxonomy and fatality classifier.
//!
//! Errors are created at the point of failure and never mutated afterwards.
//! [`classify`] is the single decision point for what is fatal (caller
//! routes to a full-page recovery view) versus recoverable (shown inline,
//! flow left in place).

use latchkey_storage::StorageError;
use latchkey_transport::TransportError;
use thiserror::Error;

/// Message shown for failures whose detail must not leak to the user.
pub const GENERIC_FATAL_MESSAGE: &str = "Something went wrong. Please try again.";

/// Fixed classification of a failed device-credential ceremony.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyCode {
    /// Ceremony aborted (caller or platform abort signal).
    Aborted,
    /// Relying party origin did not match the current domain.
    InvalidDomain,
    /// Relying-party id rejected by the platform.
    InvalidRpId,
    /// Malformed public-key algorithm list in the options.
    MalformedPubKeyAlgorithms,
    /// Authenticator cannot create discoverable credentials.
    MissingDiscoverableSupport,
    /// Authenticator cannot perform user verification.
    MissingUserVerificationSupport,
    /// Authenticator already holds a credential for this user.
    AlreadyRegistered,
    /// None of the offered algorithms are supported.
    NoSupportedAlgorithm,
    /// Generic authenticator failure.
    AuthenticatorFailure,
    /// Platform denied the ceremony (pass-through, user-recoverable).
    NotAllowed,
    /// Host has no platform credential API.
    Unsupported,
}

impl CeremonyCode {
    /// Wire/diagnostic form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            CeremonyCode::Aborted => "ERROR_CEREMONY_ABORTED",
            CeremonyCode::InvalidDomain => "ERROR_CEREMONY_INVALID_DOMAIN",
            CeremonyCode::InvalidRpId => "ERROR_CEREMONY_INVALID_RP_ID",
            CeremonyCode::MalformedPubKeyAlgorithms => "ERROR_CEREMONY_MALFORMED_PUBKEY_ALGORITHMS",
            CeremonyCode::MissingDiscoverableSupport => {
                "ERROR_CEREMONY_MISSING_DISCOVERABLE_SUPPORT"
            }
            CeremonyCode::MissingUserVerificationSupport => {
                "ERROR_CEREMONY_MISSING_USER_VERIFICATION"
            }
            CeremonyCode::AlreadyRegistered => "ERROR_CEREMONY_ALREADY_REGISTERED",
            CeremonyCode::NoSupportedAlgorithm => "ERROR_CEREMONY_NO_SUPPORTED_ALGORITHM",
            CeremonyCode::AuthenticatorFailure => "ERROR_CEREMONY_AUTHENTICATOR_FAILURE",
            CeremonyCode::NotAllowed => "ERROR_CEREMONY_NOT_ALLOWED",
            CeremonyCode::Unsupported => "ERROR_CEREMONY_UNSUPPORTED",
        }
    }

    /// Codes the user can recover from without leaving the flow.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CeremonyCode::Aborted | CeremonyCode::NotAllowed)
    }
}

impl std::fmt::Display for CeremonyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected, user-correctable business outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainCode {
    IdentifierNotRecognized,
    IdentifierAlreadyExists,
    NewDevice,
    LoginRequired,
    InvalidAuthToken,
    UnknownSignIn,
    InvalidMagicLink,
}

impl DomainCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainCode::IdentifierNotRecognized => "identifier-not-recognized",
            DomainCode::IdentifierAlreadyExists => "identifier-already-exists",
            DomainCode::NewDevice => "new-device",
            DomainCode::LoginRequired => "login-required",
            DomainCode::InvalidAuthToken => "invalid-auth-token",
            DomainCode::UnknownSignIn => "unknown-sign-in",
            DomainCode::InvalidMagicLink => "invalid-magic-link",
        }
    }
}

impl std::fmt::Display for DomainCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication error type.
///
/// `Clone` is required so concurrent refresh callers can all observe the
/// same in-flight failure.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    /// Any non-2xx HTTP outcome, with the parsed response body.
    #[error("HTTP {status}")]
    Http {
        status: u16,
        body: serde_json::Value,
    },

    /// Unexpected internal failure. Always fatal; detail is for logs only.
    #[error("Technical error: {0}")]
    Technical(String),

    /// Failed device-credential ceremony.
    #[error("Ceremony failed: {code}")]
    Ceremony { code: CeremonyCode, message: String },

    /// Expected business condition; always recoverable.
    #[error("{message}")]
    Domain {
        code: DomainCode,
        message: String,
        /// Optional wire slug for host-side translation lookup.
        slug: Option<String>,
    },

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Construct a domain error with its default message.
    pub fn domain(code: DomainCode) -> Self {
        AuthError::Domain {
            code,
            message: code.as_str().replace('-', " "),
            slug: Some(code.as_str().to_string()),
        }
    }

    /// Construct a domain error with a server-provided message.
    pub fn domain_with_message(code: DomainCode, message: impl Into<String>) -> Self {
        AuthError::Domain {
            code,
            message: message.into(),
            slug: Some(code.as_str().to_string()),
        }
    }

    pub fn ceremony(code: CeremonyCode, message: impl Into<String>) -> Self {
        AuthError::Ceremony {
            code,
            message: message.into(),
        }
    }
}

impl From<TransportError> for AuthError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Http { status, body } => AuthError::Http { status, body },
            other => AuthError::Technical(other.to_string()),
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

/// Outcome of classifying an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    /// Fatal errors replace the active flow with a recovery view;
    /// non-fatal errors annotate the flow inline.
    pub is_fatal: bool,
    pub message: String,
}

/// Best-effort message out of an HTTP error body.
fn body_message(body: &serde_json::Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

/// Whether a 404 body indicates an expired or unknown magic link, which is
/// an expected outcome of polling, not a failure.
fn is_magic_link_not_found(body: &serde_json::Value) -> bool {
    body_message(body)
        .map(|m| {
            let m = m.to_lowercase();
            m.contains("magic link") && (m.contains("not found") || m.contains("expired"))
        })
        .unwrap_or(false)
}

/// Map any error to `{is_fatal, message}`.
pub fn classify(error: &AuthError) -> Classified {
    match error {
        AuthError::Technical(_) | AuthError::Storage(_) => Classified {
            is_fatal: true,
            message: GENERIC_FATAL_MESSAGE.to_string(),
        },
        AuthError::Http { status, body } => {
            // 500 never leaks its body.
            if *status == 500 {
                return Classified {
                    is_fatal: true,
                    message: GENERIC_FATAL_MESSAGE.to_string(),
                };
            }
            if *status == 404 && is_magic_link_not_found(body) {
                return Classified {
                    is_fatal: false,
                    message: body_message(body).unwrap_or_default(),
                };
            }
            Classified {
                is_fatal: true,
                message: body_message(body).unwrap_or_else(|| GENERIC_FATAL_MESSAGE.to_string()),
            }
        }
        AuthError::Ceremony { code, message } => Classified {
            is_fatal: !code.is_recoverable(),
            message: if message.is_empty() {
                code.as_str().to_string()
            } else {
                message.clone()
            },
        },
        AuthError::Domain { message, .. } => Classified {
            is_fatal: false,
            message: message.clone(),
        },
    }
}
