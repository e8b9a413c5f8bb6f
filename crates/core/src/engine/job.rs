//! Jobs and the registry that resolves them by name.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::types::{CrawlResponse, Item, JobFailure, SeedMode};
use crate::request::CrawlRequest;

/// Extra keyword arguments passed to a job at instantiation.
pub type JobArgs = Map<String, Value>;

/// What a callback yields.
#[derive(Debug, Clone, Default)]
pub struct JobOutput {
    pub items: Vec<Item>,
    pub requests: Vec<CrawlRequest>,
}

impl JobOutput {
    pub fn item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn request(mut self, request: CrawlRequest) -> Self {
        self.requests.push(request);
        self
    }
}

/// A runnable crawling unit.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `name` is a callback [`Job::parse`] can dispatch to.
    fn has_callback(&self, name: &str) -> bool;

    /// Whether `name` is an errback [`Job::handle_failure`] can dispatch to.
    fn has_errback(&self, name: &str) -> bool;

    /// Requests scheduled when the job opens. Jobs created with
    /// [`SeedMode::SingleInjected`] return none.
    fn start_requests(&self) -> Vec<CrawlRequest>;

    /// Adjust an externally injected request before it is scheduled.
    fn modify_realtime_request(&self, request: CrawlRequest) -> CrawlRequest {
        request
    }

    /// Handle a successful response with the named callback.
    async fn parse(&self, callback: &str, response: &CrawlResponse) -> anyhow::Result<JobOutput>;

    /// Handle a failed request with the named errback.
    async fn handle_failure(&self, errback: &str, failure: &JobFailure)
        -> anyhow::Result<JobOutput>;
}

/// Rejected job arguments.
#[derive(Debug, Error)]
#[error("Invalid arguments for job '{job}': {reason}")]
pub struct JobInitError {
    pub job: String,
    pub reason: String,
}

/// Creates instances of one job type.
pub trait JobFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Names of the job's callable members. Crawl arguments may not reuse them.
    fn members(&self) -> Vec<String>;

    fn create(&self, args: JobArgs, seed_mode: SeedMode) -> Result<Box<dyn Job>, JobInitError>;
}

/// Resolves job names to factories.
pub trait JobRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<dyn JobFactory>>;

    fn names(&self) -> Vec<String>;
}

/// A fixed set of job factories.
#[derive(Default, Clone)]
pub struct StaticJobRegistry {
    factories: BTreeMap<String, Arc<dyn JobFactory>>,
}

impl StaticJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, factory: Arc<dyn JobFactory>) -> Self {
        self.register(factory);
        self
    }

    pub fn register(&mut self, factory: Arc<dyn JobFactory>) {
        self.factories.insert(factory.name().to_string(), factory);
    }
}

impl JobRegistry for StaticJobRegistry {
    fn get(&self, name: &str) -> Option<Arc<dyn JobFactory>> {
        self.factories.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl std::fmt::Debug for StaticJobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticJobRegistry")
            .field("jobs", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
