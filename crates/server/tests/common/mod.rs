//! Common test utilities for API testing with a mock upstream.
//!
//! The fixture builds the real router in-process, wired to a
//! `MockUpstreamClient` and an on-disk SQLite database in a temp directory.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use reposcout_core::{
    create_authenticator, load_config_from_str, testing::MockUpstreamClient, Authenticator,
    Config, DiscoveryOrchestrator, SqliteAnalysisCache, SqliteUserStateStore, UpstreamGate,
};
use reposcout_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use reposcout_core::testing::fixtures;

/// Config shared by every fixture; retries are near-instant.
const BASE_CONFIG: &str = r#"
[auth]
method = "none"

[budget.retry]
initial_delay_ms = 1
max_delay_ms = 2
"#;

/// Test fixture serving the API in-process.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock upstream; configure repositories, errors and quota
    pub upstream: Arc<MockUpstreamClient>,
    /// Holds the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub headers: axum::http::HeaderMap,
}

impl TestFixture {
    /// Create a fixture with discovery enabled and default settings.
    pub fn new() -> Self {
        Self::with_config(BASE_CONFIG)
    }

    /// Create a fixture from a full TOML config.
    pub fn with_config(toml: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = load_config_from_str(toml).expect("Failed to parse config");
        config.database.path = temp_dir.path().join("test.db");

        let upstream = Arc::new(MockUpstreamClient::new());
        let orchestrator = build_orchestrator(&config, upstream.clone());
        let router = build_router(config, Some(orchestrator));

        Self {
            router,
            upstream,
            temp_dir,
        }
    }

    /// Create a fixture with no upstream configured.
    pub fn without_discovery() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = load_config_from_str(BASE_CONFIG).expect("Failed to parse config");
        Self {
            router: build_router(config, None),
            upstream: Arc::new(MockUpstreamClient::new()),
            temp_dir,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request("GET", uri, None, None).await
    }

    pub async fn get_as(&self, uri: &str, user: &str) -> TestResponse {
        self.request("GET", uri, Some(user), None).await
    }

    pub async fn post_as(&self, uri: &str, user: &str, body: Value) -> TestResponse {
        self.request("POST", uri, Some(user), Some(body)).await
    }

    pub async fn delete_as(&self, uri: &str, user: &str) -> TestResponse {
        self.request("DELETE", uri, Some(user), None).await
    }

    /// Send a request with optional user header and JSON body.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("X-User-Id", user);
        }
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            body,
            headers,
        }
    }
}

fn build_orchestrator(
    config: &Config,
    upstream: Arc<MockUpstreamClient>,
) -> Arc<DiscoveryOrchestrator> {
    let store = Arc::new(
        SqliteUserStateStore::new(&config.database.path).expect("Failed to create store"),
    );
    let cache = Arc::new(
        SqliteAnalysisCache::new(&config.database.path).expect("Failed to create cache"),
    );
    let gate = Arc::new(UpstreamGate::new(&config.budget));
    Arc::new(DiscoveryOrchestrator::new(
        config, upstream, store, cache, gate,
    ))
}

fn build_router(config: Config, orchestrator: Option<Arc<DiscoveryOrchestrator>>) -> Router {
    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).expect("Failed to create authenticator"),
    );
    create_router(Arc::new(AppState::new(config, authenticator, orchestrator)))
}
