use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::aggregator::DroppedItem;
use crate::engine::{EngineError, Item, JobArgs, JobInitError};
use crate::request::{RequestError, Validation};

/// Lifecycle of a crawl session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Seeding,
    Running,
    Finished,
}

/// A validation error detected while the engine was running.
///
/// It is carried in the report rather than raised, and turned into an error
/// by whoever consumes the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct UserError {
    pub code: u16,
    pub message: String,
}

impl UserError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: 400,
            message: message.into(),
        }
    }
}

/// Errors that abort a crawl before or instead of producing a report.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl CrawlError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            CrawlError::NotFound(_) => 404,
            CrawlError::InvalidArgument(_) => 400,
            CrawlError::Engine(_) => 500,
        }
    }
}

impl From<RequestError> for CrawlError {
    fn from(e: RequestError) -> Self {
        CrawlError::InvalidArgument(e.to_string())
    }
}

impl From<JobInitError> for CrawlError {
    fn from(e: JobInitError) -> Self {
        CrawlError::InvalidArgument(e.to_string())
    }
}

/// The result of one crawl session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlReport {
    pub items: Vec<Item>,
    pub items_dropped: Vec<DroppedItem>,
    /// Engine statistics, sorted by key.
    pub stats: BTreeMap<String, Value>,
    pub job_name: String,
    pub user_error: Option<UserError>,
    /// Job error reports; only present in debug mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl CrawlReport {
    pub fn finish_reason(&self) -> Option<&str> {
        self.stats.get("finish_reason").and_then(Value::as_str)
    }

    /// Surface a carried user error.
    pub fn into_result(self) -> Result<CrawlReport, UserError> {
        match self.user_error {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

/// Everything a caller supplies for one crawl.
#[derive(Debug, Clone, Default)]
pub struct CrawlParams {
    pub job_name: String,
    /// Seed request parameters; `None` lets the job seed itself.
    pub request: Option<Map<String, Value>>,
    /// Raw `max_requests`, as a JSON number or numeric string.
    pub max_requests: Option<Value>,
    /// Extra job arguments.
    pub job_args: JobArgs,
    /// Run the job's own start requests as well as the seed.
    pub spider_start: bool,
    pub validation: Validation,
}

impl CrawlParams {
    pub fn new(job_name: impl Into<String>, request: Map<String, Value>) -> Self {
        Self {
            job_name: job_name.into(),
            request: Some(request),
            ..Default::default()
        }
    }

    /// Seed a crawl of `url` with default request settings.
    pub fn for_url(job_name: impl Into<String>, url: &str) -> Self {
        let mut request = Map::new();
        request.insert("url".to_string(), Value::String(url.to_string()));
        Self::new(job_name, request)
    }

    /// A crawl driven only by the job's own start requests.
    pub fn autonomous(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_requests(mut self, max_requests: impl Into<Value>) -> Self {
        self.max_requests = Some(max_requests.into());
        self
    }

    pub fn with_job_args(mut self, job_args: JobArgs) -> Self {
        self.job_args = job_args;
        self
    }

    pub fn with_spider_start(mut self, spider_start: bool) -> Self {
        self.spider_start = spider_start;
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// Set a seed request parameter.
    pub fn with_request_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.request
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(user_error: Option<UserError>, errors: Option<Vec<String>>) -> CrawlReport {
        let mut stats = BTreeMap::new();
        stats.insert("finish_reason".to_string(), json!("finished"));
        CrawlReport {
            items: vec![json!({"a": 1})],
            items_dropped: Vec::new(),
            stats,
            job_name: "test".to_string(),
            user_error,
            errors,
        }
    }

    #[test]
    fn test_report_serialization() {
        let value = serde_json::to_value(report(None, None)).unwrap();
        assert_eq!(value["user_error"], Value::Null);
        assert!(value.get("errors").is_none());
        assert_eq!(value["job_name"], "test");
        assert_eq!(value["stats"]["finish_reason"], "finished");

        let value = serde_json::to_value(report(None, Some(vec!["boom".into()]))).unwrap();
        assert_eq!(value["errors"], json!(["boom"]));
    }

    #[test]
    fn test_into_result() {
        assert!(report(None, None).into_result().is_ok());

        let err = report(Some(UserError::bad_request("Invalid job callback")), None)
            .into_result()
            .unwrap_err();
        assert_eq!(err.code, 400);
        assert_eq!(err.to_string(), "Invalid job callback");
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(CrawlError::NotFound("x".into()).status_code(), 404);
        assert_eq!(CrawlError::InvalidArgument("x".into()).status_code(), 400);
        assert_eq!(
            CrawlError::from(EngineError::Aborted("x".into())).status_code(),
            500
        );
        assert_eq!(CrawlError::from(RequestError::MissingUrl).status_code(), 400);
    }

    #[test]
    fn test_params_builders() {
        let params = CrawlParams::for_url("test", "http://x/")
            .with_request_param("callback", "parse_other")
            .with_max_requests(3)
            .with_spider_start(true);
        let request = params.request.unwrap();
        assert_eq!(request["url"], "http://x/");
        assert_eq!(request["callback"], "parse_other");
        assert_eq!(params.max_requests, Some(json!(3)));
        assert!(params.spider_start);
        assert!(CrawlParams::autonomous("test").request.is_none());
    }
}
