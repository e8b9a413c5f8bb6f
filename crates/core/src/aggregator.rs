//! Accumulates what one job instance produces.

use serde::Serialize;

use crate::engine::{Item, JobFailure, JobId, ResponseSummary};

/// An item removed by a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedItem {
    pub item: Item,
    #[serde(rename = "exception")]
    pub reason: String,
    pub response: Option<ResponseSummary>,
}

/// Collects items, dropped items and job errors for a single job.
///
/// Every callback takes the id of the job that emitted the signal; calls
/// for any other job are ignored.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    job: JobId,
    debug: bool,
    items: Vec<Item>,
    dropped: Vec<DroppedItem>,
    errors: Vec<String>,
}

impl ResultAggregator {
    pub fn new(job: JobId, debug: bool) -> Self {
        Self {
            job,
            debug,
            items: Vec::new(),
            dropped: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn on_item_scraped(&mut self, job: JobId, item: &Item) {
        if job == self.job {
            self.items.push(item.clone());
        }
    }

    pub fn on_item_dropped(
        &mut self,
        job: JobId,
        item: &Item,
        reason: &str,
        response: Option<&ResponseSummary>,
    ) {
        if job == self.job {
            self.dropped.push(DroppedItem {
                item: item.clone(),
                reason: reason.to_string(),
                response: response.cloned(),
            });
        }
    }

    /// Only recorded in debug mode. Engine statistics count the error either way.
    pub fn on_job_error(&mut self, job: JobId, failure: &JobFailure) {
        if job == self.job && self.debug {
            self.errors.push(failure.describe());
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn dropped(&self) -> &[DroppedItem] {
        &self.dropped
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}
