//! Transport error types.

use thiserror::Error;

/// Statuses retried by the transport layer. Everything else fails fast.
pub const TRANSIENT_STATUSES: [u16; 3] = [502, 503, 504];

/// Error type for transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Non-2xx HTTP outcome, with the parsed response body.
    #[error("HTTP {status}")]
    Http {
        status: u16,
        body: serde_json::Value,
    },

    /// Request failed at the network layer before a response arrived.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body was not the expected JSON shape.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Endpoint URL could not be constructed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl TransportError {
    /// True if the failure is transient and a retry may succeed:
    /// a gateway-range status (502/503/504) or a network-layer failure.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Http { status, .. } => TRANSIENT_STATUSES.contains(status),
            TransportError::Network(e) => {
                e.is_connect() || e.is_timeout() || e.status().is_none()
            }
            _ => false,
        }
    }

    /// The HTTP status, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            TransportError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_statuses_are_transient() {
        for status in TRANSIENT_STATUSES {
            let err = TransportError::Http {
                status,
                body: serde_json::Value::Null,
            };
            assert!(err.is_transient(), "{status} should be transient");
        }
    }

    #[test]
    fn test_client_and_server_errors_are_not_transient() {
        for status in [400, 401, 404, 409, 500, 501] {
            let err = TransportError::Http {
                status,
                body: serde_json::Value::Null,
            };
            assert!(!err.is_transient(), "{status} should not be transient");
        }
    }

    #[test]
    fn test_decode_error_is_not_transient() {
        let err: TransportError = serde_json::from_str::<serde_json::Value>("not json")
            .unwrap_err()
            .into();
        assert!(!err.is_transient());
        assert_eq!(err.status(), None);
    }
}
