//! HTTP transport base for the latchkey auth engine.
//!
//! Wraps `reqwest` behind [`ApiClient`]: JSON in/out, uniform decoding of
//! failures into [`TransportError`], retry of transient failures with a
//! linearly increasing delay, and an optional failure-telemetry side
//! channel ([`ErrorReporter`]).
//!
//! Retry policy: up to 3 attempts total; only gateway statuses (502/503/504)
//! and network-layer failures are retried. Other 4xx/5xx fail on the first
//! attempt.

mod error;
mod executor;
mod reporter;

pub use error::{TransportError, TransportResult, TRANSIENT_STATUSES};
pub use executor::{ApiRequest, ApiResponse, ReqwestExecutor, RequestExecutor, Verb};
pub use reporter::{ErrorReporter, REPORT_PATH};

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for transient-failure retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before attempt N+1 is `base_delay * N` (linear).
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given 1-indexed attempt number.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Transport base: verb wrappers with retry and uniform error decoding.
pub struct ApiClient {
    executor: Arc<dyn RequestExecutor>,
    base_url: String,
    retry: RetryPolicy,
    reporter: Option<ErrorReporter>,
}

impl ApiClient {
    /// Create a client over the production `reqwest` executor.
    pub fn new(base_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        let executor: Arc<dyn RequestExecutor> = Arc::new(ReqwestExecutor::new(publishable_key));
        Self::with_executor(executor, base_url)
    }

    /// Create a client over a custom executor (tests, instrumented hosts).
    pub fn with_executor(executor: Arc<dyn RequestExecutor>, base_url: impl Into<String>) -> Self {
        Self {
            executor,
            base_url: base_url.into(),
            retry: RetryPolicy::default(),
            reporter: None,
        }
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enable the failure-telemetry side channel.
    pub fn with_reporting(mut self, enabled: bool) -> Self {
        self.reporter = Some(ErrorReporter::new(
            self.executor.clone(),
            self.base_url.clone(),
            enabled,
        ));
        self
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Option<&str>,
    ) -> TransportResult<T> {
        self.request(Verb::Get, path, None, bearer).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
        bearer: Option<&str>,
    ) -> TransportResult<T> {
        self.request(Verb::Post, path, Some(body), bearer).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
        bearer: Option<&str>,
    ) -> TransportResult<T> {
        self.request(Verb::Put, path, Some(body), bearer).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
        bearer: Option<&str>,
    ) -> TransportResult<T> {
        self.request(Verb::Patch, path, Some(body), bearer).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Option<&str>,
    ) -> TransportResult<T> {
        self.request(Verb::Delete, path, None, bearer).await
    }

    /// Issue a request with retries and decode the 2xx body into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        verb: Verb,
        path: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> TransportResult<T> {
        let response = self.request_raw(verb, path, body, bearer).await?;
        serde_json::from_value(response).map_err(TransportError::Decode)
    }

    /// Issue a request with retries, returning the raw JSON body.
    pub async fn request_raw(
        &self,
        verb: Verb,
        path: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> TransportResult<Value> {
        let req = ApiRequest {
            verb,
            url: format!("{}{}", self.base_url, path),
            path: path.to_string(),
            body,
            bearer: bearer.map(String::from),
        };

        let mut last_error: Option<TransportError> = None;

        for attempt in 1..=self.retry.max_attempts {
            match self.executor.execute(&req).await {
                Ok(response) if response.is_success() => {
                    return Ok(response.body);
                }
                Ok(response) => {
                    let err = TransportError::Http {
                        status: response.status,
                        body: response.body,
                    };
                    if err.is_transient() && attempt < self.retry.max_attempts {
                        let delay = self.retry.delay_after_attempt(attempt);
                        debug!(
                            verb = verb.as_str(),
                            path,
                            status = response.status,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "transient HTTP failure, retrying"
                        );
                        last_error = Some(err);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    self.report_failure(path, &err).await;
                    return Err(err);
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after_attempt(attempt);
                    debug!(
                        verb = verb.as_str(),
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "network failure, retrying"
                    );
                    last_error = Some(err);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.report_failure(path, &err).await;
                    return Err(err);
                }
            }
        }

        let err = last_error.unwrap_or(TransportError::Http {
            status: 0,
            body: Value::Null,
        });
        warn!(verb = verb.as_str(), path, "request failed after retries");
        self.report_failure(path, &err).await;
        Err(err)
    }

    async fn report_failure(&self, path: &str, err: &TransportError) {
        if let Some(reporter) = &self.reporter {
            reporter.report(path, err.status(), &err.to_string()).await;
        }
    }
}
