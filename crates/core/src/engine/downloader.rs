//! Fetching requests over HTTP.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::types::CrawlResponse;
use crate::config::EngineConfig;
use crate::request::CrawlRequest;

/// Errors that can occur while fetching a request.
#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Download failed: {0}")]
    Other(String),
}

impl DownloadError {
    /// Short name used in statistics keys.
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::ConnectionFailed(_) => "connection_failed",
            DownloadError::Timeout => "timeout",
            DownloadError::InvalidRequest(_) => "invalid_request",
            DownloadError::Other(_) => "other",
        }
    }
}

/// Fetches one request.
#[async_trait]
pub trait Downloader: Send + Sync + 'static {
    async fn fetch(&self, request: &CrawlRequest) -> Result<CrawlResponse, DownloadError>;
}

/// Downloader backed by a shared `reqwest` client.
pub struct ReqwestDownloader {
    client: Client,
}

impl ReqwestDownloader {
    pub fn new(config: &EngineConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DownloadError::Other(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn header_map(request: &CrawlRequest) -> Result<HeaderMap, DownloadError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| DownloadError::InvalidRequest(format!("header '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| DownloadError::InvalidRequest(format!("header value: {}", e)))?;
        headers.insert(name, value);
    }
    if !request.cookies.is_empty() {
        let cookie = request
            .cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| DownloadError::InvalidRequest(format!("cookie: {}", e)))?;
        headers.insert(COOKIE, value);
    }
    Ok(headers)
}

#[async_trait]
impl Downloader for ReqwestDownloader {
    async fn fetch(&self, request: &CrawlRequest) -> Result<CrawlResponse, DownloadError> {
        debug!(method = %request.method, url = %request.url, flags = ?request.flags, "Fetching");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(header_map(request)?);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout
            } else if e.is_connect() {
                DownloadError::ConnectionFailed(e.to_string())
            } else {
                DownloadError::Other(e.to_string())
            }
        })?;

        let url = response.url().clone();
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        // A charset in Content-Type wins over the request's encoding.
        let body = response.text_with_charset(&request.encoding).await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout
            } else {
                DownloadError::Other(e.to_string())
            }
        })?;

        Ok(CrawlResponse {
            url,
            status,
            headers,
            body,
            request: request.clone(),
        })
    }
}
