use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::request::CrawlRequest;

/// A record produced by a job.
pub type Item = serde_json::Value;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one job instance.
///
/// Signals always carry the id of the job they originate from, so observers
/// bound to one run can ignore traffic from other runs sharing the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    /// Allocate a fresh, process-unique id.
    pub fn next() -> Self {
        Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a job instance produces its initial requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedMode {
    /// The job schedules its own start requests.
    #[default]
    Autonomous,
    /// The job produces no start requests; a single request is injected
    /// from outside once the engine goes idle.
    SingleInjected,
}

/// A fetched response handed to a job callback.
#[derive(Debug, Clone)]
pub struct CrawlResponse {
    pub url: url::Url,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// The request that produced this response.
    pub request: CrawlRequest,
}

impl CrawlResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn summary(&self) -> ResponseSummary {
        ResponseSummary {
            url: self.url.to_string(),
            status: self.status,
        }
    }
}

/// Serializable context of the response an item came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSummary {
    pub url: String,
    pub status: u16,
}

/// A failure raised while handling one request.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    /// URL of the request being handled.
    pub url: String,
    /// Callback (or errback) that failed, if the failure happened in job code.
    pub callback: Option<String>,
    /// Error message followed by its causes, on one line.
    pub detail: String,
}

impl JobFailure {
    pub fn from_error(url: &str, callback: Option<&str>, error: &anyhow::Error) -> Self {
        Self {
            url: url.to_string(),
            callback: callback.map(str::to_string),
            detail: format!("{:#}", error),
        }
    }

    /// Formatted description used in crawl results.
    pub fn describe(&self) -> String {
        match &self.callback {
            Some(callback) => format!(
                "Error processing {} in callback '{}':\n{}",
                self.url, callback, self.detail
            ),
            None => format!("Error processing {}:\n{}", self.url, self.detail),
        }
    }
}

/// Why a job run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Nothing left to do.
    Finished,
    /// The session ran past its wall-clock budget.
    Timeout,
    /// The session scheduled more requests than its budget allows.
    RequestBudgetExceeded,
    Other(String),
}

impl CloseReason {
    pub fn as_str(&self) -> &str {
        match self {
            CloseReason::Finished => "finished",
            CloseReason::Timeout => "timeout",
            CloseReason::RequestBudgetExceeded => "max_requests_exceeded",
            CloseReason::Other(reason) => reason,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an engine reports once a run is over.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineReport {
    pub stats: BTreeMap<String, serde_json::Value>,
    pub finish_reason: CloseReason,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine is not available: {0}")]
    Unavailable(String),

    #[error("Engine run aborted: {0}")]
    Aborted(String),
}
