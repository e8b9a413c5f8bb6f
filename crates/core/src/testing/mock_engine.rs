//! Engine wrappers for testing.

use async_trait::async_trait;
use serde_json::json;

use super::ScriptedJobFactory;
use crate::engine::{
    CrawlEngine, EngineError, EngineReport, EngineRun, Job, JobFactory, JobFailure, JobId,
    ResponseSummary, SeedMode, Signal, SignalBus,
};
use crate::request::CrawlRequest;

/// Shares its signal bus with a phantom job.
///
/// Before and after delegating to the wrapped engine, it emits a burst of
/// signals (items, dropped items, errors, idle and scheduling events) on
/// behalf of a different job instance, the way a pooled engine running
/// several jobs would.
pub struct ForeignSignalEngine<E> {
    inner: E,
    /// Items emitted for the foreign job per burst.
    pub foreign_items: usize,
}

impl<E: CrawlEngine> ForeignSignalEngine<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            foreign_items: 3,
        }
    }

    fn burst(&self, bus: &mut SignalBus<'_>, job: &dyn Job, foreign: JobId) {
        let response = ResponseSummary {
            url: "http://foreign.example/".to_string(),
            status: 200,
        };
        for n in 0..self.foreign_items {
            let item = json!({ "foreign": n });
            bus.emit(
                &Signal::ItemScraped {
                    item: &item,
                    response: Some(&response),
                    job: foreign,
                },
                job,
            );
        }
        let dropped = json!({ "foreign": "dropped" });
        bus.emit(
            &Signal::ItemDropped {
                item: &dropped,
                response: Some(&response),
                reason: "foreign drop",
                job: foreign,
            },
            job,
        );
        let failure = JobFailure {
            url: response.url.clone(),
            callback: Some("parse".to_string()),
            detail: "foreign failure".to_string(),
        };
        bus.emit(&Signal::JobError { failure: &failure, job: foreign }, job);
        if let Ok(url) = url::Url::parse(&response.url) {
            let request = CrawlRequest::get(url);
            bus.emit(&Signal::RequestScheduled { request: &request, job: foreign }, job);
        }
        bus.emit(&Signal::JobIdle { job: foreign }, job);
    }
}

#[async_trait]
impl<E: CrawlEngine> CrawlEngine for ForeignSignalEngine<E> {
    async fn run(
        &self,
        run: EngineRun,
        bus: &mut SignalBus<'_>,
    ) -> Result<EngineReport, EngineError> {
        let foreign = JobId::next();
        self.burst(bus, run.job.as_ref(), foreign);
        let report = self.inner.run(run, bus).await;

        // The wrapped run owned the live job; replay against a stand-in.
        let phantom = ScriptedJobFactory::new("phantom");
        if let Ok(job) = phantom.create(Default::default(), SeedMode::Autonomous) {
            self.burst(bus, job.as_ref(), foreign);
        }
        report
    }
}

/// An engine that never runs anything.
#[derive(Debug, Clone)]
pub struct FailingEngine {
    pub message: String,
}

impl FailingEngine {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl CrawlEngine for FailingEngine {
    async fn run(
        &self,
        _run: EngineRun,
        _bus: &mut SignalBus<'_>,
    ) -> Result<EngineReport, EngineError> {
        Err(EngineError::Unavailable(self.message.clone()))
    }
}
