//! Generic HTML page job.
//!
//! `parse` yields one item per page with its URL, status and title.
//! `parse_links` does the same and follows every link on the page, staying on
//! the page's host unless `same_domain` is false.

use anyhow::bail;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::{json, Value};
use url::Url;

use crate::engine::{
    CrawlResponse, Job, JobArgs, JobFactory, JobFailure, JobInitError, JobOutput, SeedMode,
};
use crate::request::CrawlRequest;

pub const PAGE_JOB_NAME: &str = "pages";

const CALLBACKS: &[&str] = &["parse", "parse_links"];
const ERRBACKS: &[&str] = &["on_error"];

static TITLE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok());
static HREF_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).ok());

/// Extract the trimmed `<title>` of an HTML document.
pub fn extract_title(html: &str) -> Option<String> {
    let re = TITLE_RE.as_ref()?;
    let title = re.captures(html)?.get(1)?.as_str();
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

/// Absolute http(s) links of an HTML document, in document order, without
/// fragments or duplicates.
pub fn extract_links(base: &Url, html: &str) -> Vec<Url> {
    let Some(re) = HREF_RE.as_ref() else {
        return Vec::new();
    };
    let mut links: Vec<Url> = Vec::new();
    for caps in re.captures_iter(html) {
        let Some(href) = caps.get(1) else { continue };
        let Ok(mut link) = base.join(href.as_str().trim()) else {
            continue;
        };
        if !matches!(link.scheme(), "http" | "https") {
            continue;
        }
        link.set_fragment(None);
        if !links.contains(&link) {
            links.push(link);
        }
    }
    links
}

/// Factory for [`PageJob`].
#[derive(Debug, Clone, Default)]
pub struct PageJobFactory;

impl PageJobFactory {
    fn init_error(reason: impl Into<String>) -> JobInitError {
        JobInitError {
            job: PAGE_JOB_NAME.to_string(),
            reason: reason.into(),
        }
    }
}

impl JobFactory for PageJobFactory {
    fn name(&self) -> &str {
        PAGE_JOB_NAME
    }

    fn members(&self) -> Vec<String> {
        CALLBACKS
            .iter()
            .chain(ERRBACKS)
            .chain(&["start_requests", "modify_realtime_request"])
            .map(|m| m.to_string())
            .collect()
    }

    fn create(&self, args: JobArgs, seed_mode: SeedMode) -> Result<Box<dyn Job>, JobInitError> {
        let start_urls = match args.get("start_urls") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(list)) => list
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(|u| Url::parse(u).map_err(|e| Self::init_error(format!("start_urls: {}", e))))
                .collect::<Result<_, _>>()?,
            Some(Value::Array(list)) => list
                .iter()
                .map(|u| {
                    u.as_str()
                        .ok_or_else(|| Self::init_error("start_urls must contain strings"))
                        .and_then(|u| {
                            Url::parse(u)
                                .map_err(|e| Self::init_error(format!("start_urls: {}", e)))
                        })
                })
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(Self::init_error("start_urls must be a list of URLs")),
        };

        let same_domain = match args.get("same_domain") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !matches!(s.as_str(), "false" | "0" | "no"),
            Some(_) => return Err(Self::init_error("same_domain must be a boolean")),
        };

        Ok(Box::new(PageJob {
            start_urls,
            same_domain,
            seed_mode,
        }))
    }
}

/// See the module documentation.
#[derive(Debug)]
pub struct PageJob {
    start_urls: Vec<Url>,
    same_domain: bool,
    seed_mode: SeedMode,
}

impl PageJob {
    fn page_item(response: &CrawlResponse) -> Value {
        json!({
            "url": response.url.as_str(),
            "status": response.status,
            "title": extract_title(&response.body),
        })
    }
}

#[async_trait]
impl Job for PageJob {
    fn name(&self) -> &str {
        PAGE_JOB_NAME
    }

    fn has_callback(&self, name: &str) -> bool {
        CALLBACKS.contains(&name)
    }

    fn has_errback(&self, name: &str) -> bool {
        ERRBACKS.contains(&name)
    }

    fn start_requests(&self) -> Vec<CrawlRequest> {
        match self.seed_mode {
            SeedMode::SingleInjected => Vec::new(),
            SeedMode::Autonomous => self
                .start_urls
                .iter()
                .map(|u| CrawlRequest::get(u.clone()).with_dont_filter(true))
                .collect(),
        }
    }

    async fn parse(&self, callback: &str, response: &CrawlResponse) -> anyhow::Result<JobOutput> {
        let output = JobOutput::default().item(Self::page_item(response));
        match callback {
            "parse" => Ok(output),
            "parse_links" => {
                let host = response.url.host_str();
                let requests = extract_links(&response.url, &response.body)
                    .into_iter()
                    .filter(|link| !self.same_domain || link.host_str() == host)
                    .map(|link| CrawlRequest::get(link).with_callback("parse_links"))
                    .collect();
                Ok(JobOutput {
                    requests,
                    ..output
                })
            }
            other => bail!("job '{}' has no callback '{}'", PAGE_JOB_NAME, other),
        }
    }

    async fn handle_failure(
        &self,
        errback: &str,
        failure: &JobFailure,
    ) -> anyhow::Result<JobOutput> {
        if !self.has_errback(errback) {
            bail!("job '{}' has no errback '{}'", PAGE_JOB_NAME, errback);
        }
        Ok(JobOutput::default().item(json!({
            "url": failure.url,
            "error": failure.detail,
        })))
    }
}
