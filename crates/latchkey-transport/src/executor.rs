//! Request execution seam.
//!
//! The retry loop and error decoding in [`crate::ApiClient`] run against
//! this narrow trait so tests can substitute a scripted executor for the
//! real `reqwest`-backed one.

use crate::{TransportError, TransportResult};
use async_trait::async_trait;
use serde_json::Value;

/// HTTP verbs supported by the transport base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }
}

/// A single outgoing request, fully resolved.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub verb: Verb,
    pub url: String,
    /// Request path relative to the base URL (kept for telemetry suppression).
    pub path: String,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

/// A received response before status/body interpretation.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes one request attempt. Network-layer failures surface as
/// `TransportError::Network`; any received response, 2xx or not, is
/// returned as-is for the caller to interpret.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, req: &ApiRequest) -> TransportResult<ApiResponse>;
}

/// Production executor over `reqwest`.
pub struct ReqwestExecutor {
    http_client: reqwest::Client,
    publishable_key: String,
}

impl ReqwestExecutor {
    pub fn new(publishable_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            publishable_key: publishable_key.into(),
        }
    }
}

#[async_trait]
impl RequestExecutor for ReqwestExecutor {
    async fn execute(&self, req: &ApiRequest) -> TransportResult<ApiResponse> {
        let mut builder = match req.verb {
            Verb::Get => self.http_client.get(&req.url),
            Verb::Post => self.http_client.post(&req.url),
            Verb::Put => self.http_client.put(&req.url),
            Verb::Patch => self.http_client.patch(&req.url),
            Verb::Delete => self.http_client.delete(&req.url),
        };

        builder = builder
            .header("X-Publishable-Key", &self.publishable_key)
            .header("Accept", "application/json");

        if let Some(bearer) = &req.bearer {
            builder = builder.header("Authorization", format!("Bearer {bearer}"));
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(TransportError::Network)?;
        let status = response.status().as_u16();
        let raw = response.text().await.map_err(TransportError::Network)?;

        // Bodies that are not JSON (gateway HTML error pages) decode to Null.
        let body = serde_json::from_str(&raw).unwrap_or(Value::Null);

        Ok(ApiResponse { status, body })
    }
}
