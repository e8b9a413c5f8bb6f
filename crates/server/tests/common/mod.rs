//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! whose engine fetches from a mock downloader, so crawls run end to end
//! without network access.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use crawlrt_core::{
    testing::{MockDownloader, ScriptedJobFactory},
    CrawlConfig, CrawlManager, Engine, EngineConfig, PageJobFactory, StaticJobRegistry,
};
use crawlrt_server::state::AppState;

/// Re-export fixtures for test convenience
pub use crawlrt_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// The registry holds the built-in `pages` job plus any scripted jobs the
/// test supplies; every fetch goes to [`MockDownloader`].
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_crawl() {
///     let fixture = TestFixture::new().await;
///     fixture.downloader.add_page("http://x/", 200, "<title>X</title>").await;
///
///     let response = fixture.get("/crawl.json?spider_name=pages&url=http://x/").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock downloader - configure pages and inspect fetches
    pub downloader: MockDownloader,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default settings.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let downloader = MockDownloader::new();

        let engine_config = EngineConfig {
            required_item_fields: test_config.required_item_fields.clone(),
            ..fixtures::engine_config()
        };
        let crawl_config = CrawlConfig {
            timeout_limit: test_config.timeout_limit,
            debug: test_config.debug,
            job_logs: false,
            ..CrawlConfig::default()
        };
        let mut registry = StaticJobRegistry::new().with(Arc::new(PageJobFactory));
        for job in test_config.jobs {
            registry.register(Arc::new(job));
        }

        let engine = Engine::new(downloader.clone(), &engine_config);
        let manager = CrawlManager::new(
            Arc::new(engine),
            Arc::new(registry),
            Arc::new(crawl_config),
        );

        let state = Arc::new(AppState::new(manager));
        let router = crawlrt_server::api::create_router(state);

        Self { router, downloader }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        self.request_raw("POST", path, body, "application/json").await
    }

    /// Send a request with raw string body and custom content type.
    async fn request_raw(
        &self,
        method: &str,
        path: &str,
        body: &str,
        content_type: &str,
    ) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap();

        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    /// Send a prepared request and return the raw response.
    pub async fn send_raw(&self, request: Request<Body>) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.send_raw(request).await;

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Session timeout in seconds
    pub timeout_limit: u64,
    /// Include job error reports in responses
    pub debug: bool,
    /// Items missing any of these fields are dropped
    pub required_item_fields: Vec<String>,
    /// Scripted jobs registered next to the built-in ones
    pub jobs: Vec<ScriptedJobFactory>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            timeout_limit: 30,
            debug: true,
            required_item_fields: Vec::new(),
            jobs: Vec::new(),
        }
    }
}

impl TestConfig {
    /// Register scripted jobs.
    pub fn with_jobs(jobs: Vec<ScriptedJobFactory>) -> Self {
        Self {
            jobs,
            ..Self::default()
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
