//! Mock downloader for testing.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;

use crate::engine::{CrawlResponse, DownloadError, Downloader};
use crate::request::CrawlRequest;

/// A page served by [`MockDownloader`].
#[derive(Debug, Clone)]
pub struct MockPage {
    pub status: u16,
    pub body: String,
    /// Time the fetch takes.
    pub delay: Duration,
}

/// A recorded fetch for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    pub request: CrawlRequest,
    /// When the fetch started.
    pub timestamp: Instant,
}

/// Mock implementation of the Downloader trait.
///
/// Serves configured pages by URL, answers 404 for everything else, and
/// records every fetch. Clones share state, so a test can keep one handle
/// while the engine owns another.
///
/// # Example
///
/// ```rust,ignore
/// let downloader = MockDownloader::new();
/// downloader.add_page("http://x/page1", 200, "<title>One</title>").await;
///
/// let engine = Engine::new(downloader.clone(), &EngineConfig::default());
/// // ... run a crawl ...
/// assert_eq!(downloader.fetch_count().await, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockDownloader {
    pages: Arc<RwLock<HashMap<String, MockPage>>>,
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
    /// If set, the next fetch will fail with this error.
    next_error: Arc<RwLock<Option<DownloadError>>>,
}

fn page_key(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl MockDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with `status` at `url`.
    pub async fn add_page(&self, url: &str, status: u16, body: &str) {
        self.add_slow_page(url, status, body, Duration::ZERO).await;
    }

    /// Serve a page that takes `delay` to fetch.
    pub async fn add_slow_page(&self, url: &str, status: u16, body: &str, delay: Duration) {
        self.pages.write().await.insert(
            page_key(url),
            MockPage {
                status,
                body: body.to_string(),
                delay,
            },
        );
    }

    /// Make the next fetch fail.
    pub async fn set_next_error(&self, error: DownloadError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recorded_fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    pub async fn fetched_urls(&self) -> Vec<String> {
        self.fetches
            .read()
            .await
            .iter()
            .map(|f| f.request.url.to_string())
            .collect()
    }

    pub async fn fetch_count(&self) -> usize {
        self.fetches.read().await.len()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn fetch(&self, request: &CrawlRequest) -> Result<CrawlResponse, DownloadError> {
        self.fetches.write().await.push(RecordedFetch {
            request: request.clone(),
            timestamp: Instant::now(),
        });

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        let page = self
            .pages
            .read()
            .await
            .get(request.url.as_str())
            .cloned()
            .unwrap_or(MockPage {
                status: 404,
                body: "Not Found".to_string(),
                delay: Duration::ZERO,
            });

        if !page.delay.is_zero() {
            tokio::time::sleep(page.delay).await;
        }

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());

        Ok(CrawlResponse {
            url: request.url.clone(),
            status: page.status,
            headers,
            body: page.body,
            request: request.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> CrawlRequest {
        CrawlRequest::get(Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_serves_configured_pages() {
        let downloader = MockDownloader::new();
        downloader.add_page("http://x/page1", 200, "hello").await;

        let response = downloader.fetch(&get("http://x/page1")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "hello");

        let missing = downloader.fetch(&get("http://x/other")).await.unwrap();
        assert_eq!(missing.status, 404);

        assert_eq!(
            downloader.fetched_urls().await,
            vec!["http://x/page1", "http://x/other"]
        );
    }

    #[tokio::test]
    async fn test_next_error_is_consumed() {
        let downloader = MockDownloader::new();
        downloader.set_next_error(DownloadError::Timeout).await;

        assert!(downloader.fetch(&get("http://x/")).await.is_err());
        assert!(downloader.fetch(&get("http://x/")).await.is_ok());
        assert_eq!(downloader.fetch_count().await, 2);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let downloader = MockDownloader::new();
        let engine_side = downloader.clone();
        downloader.add_page("http://x/", 200, "").await;
        engine_side.fetch(&get("http://x/")).await.unwrap();
        assert_eq!(downloader.fetch_count().await, 1);
    }
}
