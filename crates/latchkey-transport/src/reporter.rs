//! Failure telemetry side channel.

use crate::{ApiRequest, ApiResponse, RequestExecutor, Verb};
use std::sync::Arc;
use tracing::debug;

/// Path the reporter posts to. Failures on this path are never reported,
/// so a broken reporting endpoint cannot feed itself.
pub const REPORT_PATH: &str = "/v1/errors";

/// Posts failure telemetry for server-side errors.
///
/// Reports are suppressed for: statuses below 500, hosts that disabled
/// telemetry, and failures of the reporting endpoint itself. Reporting is
/// fire-and-forget; a failed report is only logged.
pub struct ErrorReporter {
    executor: Arc<dyn RequestExecutor>,
    base_url: String,
    enabled: bool,
}

impl ErrorReporter {
    pub fn new(executor: Arc<dyn RequestExecutor>, base_url: impl Into<String>, enabled: bool) -> Self {
        Self {
            executor,
            base_url: base_url.into(),
            enabled,
        }
    }

    /// Whether a failure on `path` with `status` should be reported.
    pub fn should_report(&self, path: &str, status: Option<u16>) -> bool {
        if !self.enabled {
            return false;
        }
        if path == REPORT_PATH {
            return false;
        }
        match status {
            Some(status) => status >= 500,
            // No status means the request died at the network layer;
            // nothing useful to report server-side.
            None => false,
        }
    }

    /// Post a failure report. Errors are swallowed after logging.
    pub async fn report(&self, path: &str, status: Option<u16>, message: &str) {
        if !self.should_report(path, status) {
            return;
        }

        let req = ApiRequest {
            verb: Verb::Post,
            url: format!("{}{}", self.base_url, REPORT_PATH),
            path: REPORT_PATH.to_string(),
            body: Some(serde_json::json!({
                "id": uuid::Uuid::new_v4().to_string(),
                "path": path,
                "status": status,
                "message": message,
            })),
            bearer: None,
        };

        match self.executor.execute(&req).await {
            Ok(ApiResponse { status, .. }) if (200..300).contains(&status) => {}
            Ok(ApiResponse { status, .. }) => {
                debug!(status, "error report rejected");
            }
            Err(e) => {
                debug!(error = %e, "error report failed");
            }
        }
    }
}
