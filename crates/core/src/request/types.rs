use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

/// Callback used when a request does not name one.
pub const DEFAULT_CALLBACK: &str = "parse";

/// A request to be scheduled by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRequest {
    pub url: Url,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub body: Option<String>,
    pub meta: Map<String, Value>,
    /// Name of the job callback handling the response.
    pub callback: Option<String>,
    /// Name of the job callback handling failures.
    pub errback: Option<String>,
    /// Bypass request de-duplication.
    pub dont_filter: bool,
    /// Higher runs first.
    pub priority: i32,
    pub encoding: String,
    pub flags: Vec<String>,
}

impl CrawlRequest {
    /// A plain GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            body: None,
            meta: Map::new(),
            callback: None,
            errback: None,
            dont_filter: false,
            priority: 0,
            encoding: "utf-8".to_string(),
            flags: Vec::new(),
        }
    }

    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    pub fn with_errback(mut self, errback: impl Into<String>) -> Self {
        self.errback = Some(errback.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dont_filter(mut self, dont_filter: bool) -> Self {
        self.dont_filter = dont_filter;
        self
    }

    /// Callback that should handle the response.
    pub fn callback_name(&self) -> &str {
        self.callback.as_deref().unwrap_or(DEFAULT_CALLBACK)
    }
}
