//! Scripted job for testing.

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::engine::{
    CrawlResponse, Item, Job, JobArgs, JobFactory, JobFailure, JobInitError, JobOutput, SeedMode,
};
use crate::request::CrawlRequest;

/// What the scripted job does with one page.
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    items: Vec<Item>,
    follow: Vec<(String, Option<String>)>,
    failure: Option<String>,
}

impl PageScript {
    /// Yield an item.
    pub fn item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    /// Yield a request for `url`, handled by the default callback.
    pub fn follow(mut self, url: &str) -> Self {
        self.follow.push((url.to_string(), None));
        self
    }

    /// Yield a request for `url`, handled by `callback`.
    pub fn follow_with(mut self, url: &str, callback: &str) -> Self {
        self.follow.push((url.to_string(), Some(callback.to_string())));
        self
    }

    /// Fail the callback with `message`.
    pub fn fail(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }
}

/// Factory for [`ScriptedJob`]s.
///
/// # Example
///
/// ```rust,ignore
/// let factory = ScriptedJobFactory::new("test")
///     .on_page("http://x/page1", |page| page.item(json!({"n": 1})).follow("http://x/page2"))
///     .on_page("http://x/page2", |page| page.fail("boom"));
/// let registry = StaticJobRegistry::new().with(Arc::new(factory));
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedJobFactory {
    name: String,
    start_urls: Vec<String>,
    callbacks: Vec<String>,
    errbacks: Vec<String>,
    scripts: Arc<HashMap<String, PageScript>>,
}

impl ScriptedJobFactory {
    /// A job with a single `parse` callback and no start URLs.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start_urls: Vec::new(),
            callbacks: vec!["parse".to_string()],
            errbacks: Vec::new(),
            scripts: Arc::new(HashMap::new()),
        }
    }

    pub fn start_urls(mut self, urls: &[&str]) -> Self {
        self.start_urls = urls.iter().map(|u| u.to_string()).collect();
        self
    }

    /// Additional callbacks; every one of them runs the page script.
    pub fn with_callbacks(mut self, callbacks: &[&str]) -> Self {
        self.callbacks
            .extend(callbacks.iter().map(|c| c.to_string()));
        self
    }

    /// Errbacks; each yields one `{"url", "error"}` item per failure.
    pub fn with_errbacks(mut self, errbacks: &[&str]) -> Self {
        self.errbacks.extend(errbacks.iter().map(|e| e.to_string()));
        self
    }

    /// Script the response to `url`.
    pub fn on_page(mut self, url: &str, script: impl FnOnce(PageScript) -> PageScript) -> Self {
        let key = Url::parse(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());
        Arc::make_mut(&mut self.scripts).insert(key, script(PageScript::default()));
        self
    }
}

impl JobFactory for ScriptedJobFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn members(&self) -> Vec<String> {
        let mut members: Vec<String> = self
            .callbacks
            .iter()
            .chain(self.errbacks.iter())
            .cloned()
            .collect();
        members.push("start_requests".to_string());
        members.push("modify_realtime_request".to_string());
        members
    }

    fn create(&self, args: JobArgs, seed_mode: SeedMode) -> Result<Box<dyn Job>, JobInitError> {
        let start_urls = match args.get("start_urls") {
            None => self.start_urls.clone(),
            Some(Value::Array(urls)) => urls
                .iter()
                .map(|u| u.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| JobInitError {
                    job: self.name.clone(),
                    reason: "start_urls must be a list of strings".to_string(),
                })?,
            Some(_) => {
                return Err(JobInitError {
                    job: self.name.clone(),
                    reason: "start_urls must be a list of strings".to_string(),
                })
            }
        };

        Ok(Box::new(ScriptedJob {
            name: self.name.clone(),
            start_urls,
            callbacks: self.callbacks.clone(),
            errbacks: self.errbacks.clone(),
            scripts: Arc::clone(&self.scripts),
            seed_mode,
            args,
        }))
    }
}

/// A job that answers pages from a script.
#[derive(Debug)]
pub struct ScriptedJob {
    name: String,
    start_urls: Vec<String>,
    callbacks: Vec<String>,
    errbacks: Vec<String>,
    scripts: Arc<HashMap<String, PageScript>>,
    seed_mode: SeedMode,
    args: JobArgs,
}

impl ScriptedJob {
    pub fn args(&self) -> &JobArgs {
        &self.args
    }
}

#[async_trait]
impl Job for ScriptedJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_callback(&self, name: &str) -> bool {
        self.callbacks.iter().any(|c| c == name)
    }

    fn has_errback(&self, name: &str) -> bool {
        self.errbacks.iter().any(|e| e == name)
    }

    fn start_requests(&self) -> Vec<CrawlRequest> {
        if self.seed_mode == SeedMode::SingleInjected {
            return Vec::new();
        }
        self.start_urls
            .iter()
            .filter_map(|u| Url::parse(u).ok())
            .map(|u| CrawlRequest::get(u).with_dont_filter(true))
            .collect()
    }

    /// Marks injected requests so tests can see the hook ran.
    fn modify_realtime_request(&self, request: CrawlRequest) -> CrawlRequest {
        request.with_meta("realtime", Value::Bool(true))
    }

    async fn parse(&self, callback: &str, response: &CrawlResponse) -> anyhow::Result<JobOutput> {
        if !self.has_callback(callback) {
            bail!("job '{}' has no callback '{}'", self.name, callback);
        }

        let script = self
            .scripts
            .get(response.request.url.as_str())
            .cloned()
            .unwrap_or_default();

        if let Some(message) = script.failure {
            return Err(anyhow!(message))
                .with_context(|| format!("scripted failure on {}", response.url));
        }

        let mut output = JobOutput {
            items: script.items,
            requests: Vec::new(),
        };
        for (url, callback) in script.follow {
            let url = Url::parse(&url).with_context(|| format!("bad follow URL {}", url))?;
            let mut request = CrawlRequest::get(url);
            request.callback = callback;
            output.requests.push(request);
        }
        Ok(output)
    }

    async fn handle_failure(
        &self,
        errback: &str,
        failure: &JobFailure,
    ) -> anyhow::Result<JobOutput> {
        if !self.has_errback(errback) {
            bail!("job '{}' has no errback '{}'", self.name, errback);
        }
        Ok(JobOutput::default().item(json!({
            "url": failure.url,
            "error": failure.detail,
        })))
    }
}
