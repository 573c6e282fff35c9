//! Access-token decoding for expiry tracking.
//!
//! The engine treats tokens as opaque bearer strings except for the claims
//! segment, which it decodes locally to track expiry. Signature
//! verification is the server's job, never done here.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Decode the claims segment of a JWT-shaped token.
///
/// Returns `None` for anything that is not three dot-separated base64url
/// segments with a JSON object in the middle.
pub fn decode_claims(token: &str) -> Option<Value> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let claims = segments.next()?;
    let _signature = segments.next()?;
    if segments.next().is_some() {
        return None;
    }

    let raw = URL_SAFE_NO_PAD.decode(claims).ok()?;
    let value: Value = serde_json::from_slice(&raw).ok()?;
    value.is_object().then_some(value)
}

/// Extract the `exp` claim as an instant.
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let claims = decode_claims(token)?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

/// True when the token is syntactically valid enough to back an
/// authenticated session.
pub fn is_decodable(token: &str) -> bool {
    decode_claims(token).is_some()
}
