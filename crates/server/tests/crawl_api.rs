//! E2E tests for the crawl API.
//!
//! These drive `/crawl.json` through the in-process router with a mock
//! downloader behind the engine.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;

use common::{fixtures, TestConfig, TestFixture};
use crawlrt_core::testing::ScriptedJobFactory;

async fn site(fixture: &TestFixture) {
    fixture
        .downloader
        .add_page(
            "http://site.test/",
            200,
            &fixtures::page_html("Home", &["/about", "http://elsewhere.test/"]),
        )
        .await;
    fixture
        .downloader
        .add_page("http://site.test/about", 200, &fixtures::page_html("About", &["/"]))
        .await;
}

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/health").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));
}

#[tokio::test]
async fn test_get_crawl_single_page() {
    let fixture = TestFixture::new().await;
    site(&fixture).await;

    let response = fixture
        .get("/crawl.json?spider_name=pages&url=http://site.test/")
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));
    assert_json_path!(response.body, "job_name", json!("pages"));
    assert_json_path!(
        response.body,
        "items",
        json!([{"url": "http://site.test/", "status": 200, "title": "Home"}])
    );
    assert_json_path!(response.body, "items_dropped", json!([]));
    assert_eq!(response.body["stats"]["finish_reason"], json!("finished"));
    assert!(response.body.get("errors").is_none());
    assert!(response.body.get("user_error").is_none());
    assert_eq!(fixture.downloader.fetch_count().await, 1);
}

#[tokio::test]
async fn test_get_crawl_follows_links_with_callback() {
    let fixture = TestFixture::new().await;
    site(&fixture).await;

    let response = fixture
        .get("/crawl.json?spider_name=pages&url=http://site.test/&callback=parse_links")
        .await;

    assert_status!(response, StatusCode::OK);
    let titles: Vec<_> = response.body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["title"].clone())
        .collect();
    assert_eq!(titles, vec![json!("Home"), json!("About")]);
    // The off-site link and the link back home are not fetched.
    assert_eq!(
        fixture.downloader.fetched_urls().await,
        vec!["http://site.test/", "http://site.test/about"]
    );
}

#[tokio::test]
async fn test_get_crawl_with_max_requests() {
    let fixture = TestFixture::new().await;
    site(&fixture).await;

    let response = fixture
        .get("/crawl.json?spider_name=pages&url=http://site.test/&callback=parse_links&max_requests=1")
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["items"].as_array().unwrap().len(), 1);
    assert_eq!(
        response.body["stats"]["finish_reason"],
        json!("max_requests_exceeded")
    );
    assert_eq!(fixture.downloader.fetch_count().await, 1);
}

#[tokio::test]
async fn test_get_invalid_max_requests() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .get("/crawl.json?spider_name=pages&url=http://site.test/&max_requests=many")
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_json_path!(response.body, "status", json!("error"));
}

#[tokio::test]
async fn test_get_nonexistent_callback() {
    let fixture = TestFixture::new().await;
    site(&fixture).await;

    let response = fixture
        .get("/crawl.json?spider_name=pages&url=http://site.test/&callback=nonexistent_method")
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_json_path!(response.body, "status", json!("error"));
    assert_json_path!(response.body, "code", json!(400));
    let message = response.body["message"].as_str().unwrap();
    assert!(message.contains("nonexistent_method"), "message: {}", message);
    assert_eq!(fixture.downloader.fetch_count().await, 0);
}

#[tokio::test]
async fn test_get_handler_kind_mismatch() {
    let fixture = TestFixture::new().await;
    site(&fixture).await;

    for (query, name) in [
        ("callback=on_error", "on_error"),
        ("errback=parse", "parse"),
    ] {
        let response = fixture
            .get(&format!(
                "/crawl.json?spider_name=pages&url=http://site.test/&{}",
                query
            ))
            .await;

        assert_status!(response, StatusCode::BAD_REQUEST);
        assert_json_path!(response.body, "code", json!(400));
        let message = response.body["message"].as_str().unwrap();
        assert!(message.contains(name), "message: {}", message);
    }
    assert_eq!(fixture.downloader.fetch_count().await, 0);
}

#[tokio::test]
async fn test_get_missing_parameters() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/crawl.json").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_json_path!(
        response.body,
        "message",
        json!("Missing required parameter: 'url'")
    );

    let response = fixture.get("/crawl.json?url=http://site.test/").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_json_path!(
        response.body,
        "message",
        json!("Missing required parameter: 'spider_name'")
    );
}

#[tokio::test]
async fn test_get_relative_url_is_rejected() {
    let fixture = TestFixture::new().await;
    for url in ["//site.test/x", "site.test/x"] {
        let response = fixture
            .get(&format!("/crawl.json?spider_name=pages&url={}", url))
            .await;
        assert_status!(response, StatusCode::BAD_REQUEST);
    }
    assert_eq!(fixture.downloader.fetch_count().await, 0);
}

#[tokio::test]
async fn test_unknown_job() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .get("/crawl.json?spider_name=nope&url=http://site.test/")
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
    assert_json_path!(response.body, "code", json!(404));
    assert_eq!(fixture.downloader.fetch_count().await, 0);
}

#[tokio::test]
async fn test_crawl_args_cannot_override_callbacks() {
    let fixture = TestFixture::new().await;
    // crawl_args={"parse":1}
    let response = fixture
        .get("/crawl.json?spider_name=pages&url=http://site.test/&crawl_args=%7B%22parse%22%3A1%7D")
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .contains("'parse'"));
}

#[tokio::test]
async fn test_post_crawl() {
    let fixture = TestFixture::new().await;
    site(&fixture).await;

    let response = fixture
        .post(
            "/crawl.json",
            json!({
                "spider_name": "pages",
                "max_requests": 5,
                "request": {
                    "url": "http://site.test/",
                    "callback": "parse_links",
                    "meta": {"source": "test"}
                }
            }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["items"].as_array().unwrap().len(), 2);
    assert_eq!(response.body["stats"]["finish_reason"], json!("finished"));
}

#[tokio::test]
async fn test_post_rejects_unknown_request_keys() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post(
            "/crawl.json",
            json!({
                "spider_name": "pages",
                "request": {"url": "http://site.test/", "not_a_field": 1}
            }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .contains("not_a_field"));
}

#[tokio::test]
async fn test_post_missing_url() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post(
            "/crawl.json",
            json!({"spider_name": "pages", "request": {"callback": "parse"}}),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_json_path!(
        response.body,
        "message",
        json!("Missing required key 'url' in 'request' object")
    );
}

#[tokio::test]
async fn test_post_malformed_json() {
    let fixture = TestFixture::new().await;
    let response = fixture.post_raw("/crawl.json", "{not json").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_json_path!(response.body, "status", json!("error"));
    assert_json_path!(response.body, "code", json!(400));
}

#[tokio::test]
async fn test_job_errors_reported_in_debug_mode() {
    let broken = ScriptedJobFactory::new("broken")
        .on_page("http://site.test/", |p| p.fail("parser exploded"));
    let fixture = TestFixture::with_config(TestConfig::with_jobs(vec![broken])).await;
    site(&fixture).await;

    let response = fixture
        .get("/crawl.json?spider_name=broken&url=http://site.test/")
        .await;

    assert_status!(response, StatusCode::OK);
    let errors = response.body["errors"].as_array().expect("errors expected");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().contains("parser exploded"));
}

#[tokio::test]
async fn test_dropped_items_are_reported() {
    let fixture = TestFixture::with_config(TestConfig {
        required_item_fields: vec!["author".to_string()],
        ..TestConfig::default()
    })
    .await;
    site(&fixture).await;

    let response = fixture
        .get("/crawl.json?spider_name=pages&url=http://site.test/")
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "items", json!([]));
    let dropped = &response.body["items_dropped"][0];
    assert_eq!(dropped["exception"], json!("Missing field: author"));
    assert_eq!(dropped["item"]["title"], json!("Home"));
    assert_eq!(dropped["response"]["status"], json!(200));
}

#[tokio::test]
async fn test_unknown_path() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/nothing/here").await;
    assert_status!(response, StatusCode::NOT_FOUND);
    assert_json_path!(response.body, "status", json!("error"));
}

#[tokio::test]
async fn test_cors_headers() {
    let fixture = TestFixture::new().await;
    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://browser.test")
        .body(Body::empty())
        .unwrap();

    let response = fixture.send_raw(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    site(&fixture).await;
    fixture
        .get("/crawl.json?spider_name=pages&url=http://site.test/")
        .await;

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = fixture.send_raw(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("crawlrt_sessions_total"));
    assert!(text.contains("crawlrt_http_requests_total"));
}
