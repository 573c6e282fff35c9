//! Test doubles shared across the engine's test modules.

use async_trait::async_trait;
use latchkey_transport::{ApiRequest, ApiResponse, RequestExecutor, TransportResult, Verb};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A scripted response for one verb/path pair.
#[derive(Debug, Clone)]
pub struct Route {
    pub verb: Verb,
    pub path: String,
    pub status: u16,
    pub body: Value,
}

impl Route {
    pub fn get(path: &str, body: Value) -> Self {
        Self {
            verb: Verb::Get,
            path: path.to_string(),
            status: 200,
            body,
        }
    }

    pub fn post(path: &str, body: Value) -> Self {
        Self {
            verb: Verb::Post,
            path: path.to_string(),
            status: 200,
            body,
        }
    }

    pub fn get_status(path: &str, status: u16) -> Self {
        Self {
            verb: Verb::Get,
            path: path.to_string(),
            status,
            body: Value::Null,
        }
    }

    pub fn post_status(path: &str, status: u16) -> Self {
        Self {
            verb: Verb::Post,
            path: path.to_string(),
            status,
            body: Value::Null,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

/// Routing executor double. Unrouted paths answer 404 so "unknown
/// resource" flows exercise the same code path as production.
pub struct FakeApi {
    routes: Mutex<HashMap<(Verb, String), Route>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn route(&self, route: Route) {
        self.routes
            .lock()
            .unwrap()
            .insert((route.verb, route.path.clone()), route);
    }

    /// Number of requests seen for the given path, any verb.
    pub fn calls(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|req| req.path == path)
            .count()
    }

    /// The most recent request for the given path.
    pub fn last_request(&self, path: &str) -> Option<ApiRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|req| req.path == path)
            .cloned()
    }
}

#[async_trait]
impl RequestExecutor for FakeApi {
    async fn execute(&self, req: &ApiRequest) -> TransportResult<ApiResponse> {
        // Suspend before responding so concurrent callers genuinely overlap
        // on the current-thread test runtime; without a yield point each
        // spawned task would run to completion before the next starts.
        tokio::task::yield_now().await;
        self.requests.lock().unwrap().push(req.clone());
        let routes = self.routes.lock().unwrap();
        match routes.get(&(req.verb, req.path.clone())) {
            Some(route) => Ok(ApiResponse {
                status: route.status,
                body: route.body.clone(),
            }),
            None => Ok(ApiResponse {
                status: 404,
                body: Value::Null,
            }),
        }
    }
}
