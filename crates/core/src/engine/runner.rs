//! Reference crawl engine.
//!
//! One [`Engine`] can serve many runs; each run owns its scheduler and
//! statistics and talks to its observers through the [`SignalBus`] it is
//! given. Signals are delivered one at a time from the run loop, while
//! downloads proceed concurrently up to the configured limit.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::downloader::{DownloadError, Downloader};
use super::job::{Job, JobOutput};
use super::pipeline::{ItemPipeline, RequiredFieldsPipeline};
use super::scheduler::Scheduler;
use super::signals::{EngineCommand, Signal, SignalAck, SignalBus};
use super::stats::StatsCollector;
use super::types::{
    CloseReason, CrawlResponse, EngineError, EngineReport, Item, JobFailure, JobId,
    ResponseSummary,
};
use crate::config::EngineConfig;
use crate::request::CrawlRequest;

/// One job instance handed to an engine.
pub struct EngineRun {
    pub job_id: JobId,
    pub job: Box<dyn Job>,
}

/// An engine able to run jobs to completion.
#[async_trait]
pub trait CrawlEngine: Send + Sync {
    /// Run `run.job` until it finishes or an observer closes it.
    async fn run(
        &self,
        run: EngineRun,
        bus: &mut SignalBus<'_>,
    ) -> Result<EngineReport, EngineError>;
}

type Download = BoxFuture<'static, (CrawlRequest, Result<CrawlResponse, DownloadError>)>;

/// The reference engine.
pub struct Engine<D: Downloader> {
    downloader: Arc<D>,
    pipelines: Vec<Arc<dyn ItemPipeline>>,
    concurrency: usize,
    idle_interval: Duration,
}

impl<D: Downloader> Engine<D> {
    pub fn new(downloader: D, config: &EngineConfig) -> Self {
        let mut engine = Self {
            downloader: Arc::new(downloader),
            pipelines: Vec::new(),
            concurrency: config.concurrent_requests.max(1),
            idle_interval: Duration::from_millis(config.idle_interval_ms),
        };
        if !config.required_item_fields.is_empty() {
            engine = engine.with_pipeline(Arc::new(RequiredFieldsPipeline::new(
                config.required_item_fields.clone(),
            )));
        }
        engine
    }

    pub fn with_pipeline(mut self, pipeline: Arc<dyn ItemPipeline>) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    async fn handle_download(
        &self,
        state: &mut RunState<'_>,
        bus: &mut SignalBus<'_>,
        request: CrawlRequest,
        result: Result<CrawlResponse, DownloadError>,
    ) {
        match result {
            Ok(response) => {
                state.stats.inc("downloader/response_count");
                state.stats.inc(format!(
                    "downloader/response_status_count/{}",
                    response.status
                ));
                state.stats.inc("response_received_count");
                debug!(status = response.status, url = %response.url, "Crawled");

                let summary = response.summary();
                if response.is_success() {
                    let callback = request.callback_name().to_string();
                    let outcome = state.job.parse(&callback, &response).await;
                    self.handle_output(state, bus, &request, &callback, outcome, Some(&summary));
                    return;
                }

                let failure = JobFailure {
                    url: request.url.to_string(),
                    callback: None,
                    detail: format!("Ignoring non-200 response (HTTP {})", response.status),
                };
                match request.errback.clone() {
                    Some(errback) => {
                        let outcome = state.job.handle_failure(&errback, &failure).await;
                        self.handle_output(state, bus, &request, &errback, outcome, Some(&summary));
                    }
                    None => {
                        state.stats.inc("httperror/response_ignored_count");
                        state.stats.inc(format!(
                            "httperror/response_ignored_status_count/{}",
                            response.status
                        ));
                        info!(
                            "Ignoring response <{} {}>: HTTP status code is not handled",
                            response.status, response.url
                        );
                    }
                }
            }
            Err(error) => {
                state.stats.inc("downloader/exception_count");
                state.stats.inc(format!(
                    "downloader/exception_type_count/{}",
                    error.kind()
                ));

                let failure = JobFailure {
                    url: request.url.to_string(),
                    callback: None,
                    detail: error.to_string(),
                };
                match request.errback.clone() {
                    Some(errback) => {
                        let outcome = state.job.handle_failure(&errback, &failure).await;
                        self.handle_output(state, bus, &request, &errback, outcome, None);
                    }
                    None => warn!("Error downloading {}: {}", request.url, error),
                }
            }
        }
    }

    fn handle_output(
        &self,
        state: &mut RunState<'_>,
        bus: &mut SignalBus<'_>,
        request: &CrawlRequest,
        callback: &str,
        outcome: anyhow::Result<JobOutput>,
        response: Option<&ResponseSummary>,
    ) {
        let output = match outcome {
            Ok(output) => output,
            Err(error) => {
                let failure = JobFailure::from_error(request.url.as_str(), Some(callback), &error);
                warn!(
                    "Job callback '{}' failed on {}: {:#}",
                    callback, request.url, error
                );
                state.stats.inc("spider_exceptions/count");
                state.emit(
                    bus,
                    &Signal::JobError {
                        failure: &failure,
                        job: state.job_id,
                    },
                );
                return;
            }
        };

        for item in output.items {
            match self.run_pipelines(item, response) {
                Ok(item) => {
                    state.stats.inc("item_scraped_count");
                    state.emit(
                        bus,
                        &Signal::ItemScraped {
                            item: &item,
                            response,
                            job: state.job_id,
                        },
                    );
                }
                Err((item, pipeline, reason)) => {
                    state.stats.inc("item_dropped_count");
                    state
                        .stats
                        .inc(format!("item_dropped_reasons_count/{}", pipeline));
                    debug!("Dropped item: {}", reason);
                    state.emit(
                        bus,
                        &Signal::ItemDropped {
                            item: &item,
                            response,
                            reason: &reason,
                            job: state.job_id,
                        },
                    );
                }
            }
        }

        for follow in output.requests {
            state.schedule(bus, follow);
        }
    }

    /// Run an item through every pipeline; on drop, return the item as the
    /// dropping pipeline received it.
    fn run_pipelines(
        &self,
        mut item: Item,
        response: Option<&ResponseSummary>,
    ) -> Result<Item, (Item, String, String)> {
        for pipeline in &self.pipelines {
            let input = item.clone();
            item = pipeline
                .process_item(item, response)
                .map_err(|drop| (input, pipeline.name().to_string(), drop.0))?;
        }
        Ok(item)
    }
}

#[async_trait]
impl<D: Downloader> CrawlEngine for Engine<D> {
    async fn run(
        &self,
        run: EngineRun,
        bus: &mut SignalBus<'_>,
    ) -> Result<EngineReport, EngineError> {
        let EngineRun { job_id, job } = run;
        let mut state = RunState::new(job_id, job.as_ref());
        info!("Job '{}' opened", job.name());

        state.emit(bus, &Signal::EngineOpened);
        state.emit(bus, &Signal::JobOpened { job: job_id });
        for request in job.start_requests() {
            state.schedule(bus, request);
        }

        let mut in_flight: FuturesUnordered<Download> = FuturesUnordered::new();

        while state.close.is_none() {
            while in_flight.len() < self.concurrency {
                let Some(request) = state.scheduler.next_request() else {
                    break;
                };
                state.stats.inc("scheduler/dequeued");
                state.stats.inc("downloader/request_count");
                state.stats.inc(format!(
                    "downloader/request_method_count/{}",
                    request.method
                ));
                let downloader = Arc::clone(&self.downloader);
                in_flight.push(
                    async move {
                        let result = downloader.fetch(&request).await;
                        (request, result)
                    }
                    .boxed(),
                );
            }

            if in_flight.is_empty() {
                let ack = state.emit(bus, &Signal::JobIdle { job: job_id });
                if state.close.is_some() || !state.scheduler.is_empty() {
                    continue;
                }
                if ack == SignalAck::DontClose {
                    tokio::time::sleep(self.idle_interval).await;
                    continue;
                }
                state.close = Some(CloseReason::Finished);
                break;
            }

            if let Some((request, result)) = in_flight.next().await {
                self.handle_download(&mut state, bus, request, result).await;
            }
        }

        if !in_flight.is_empty() {
            debug!("Abandoning {} in-flight downloads", in_flight.len());
        }
        drop(in_flight);

        let reason = state.close.take().unwrap_or(CloseReason::Finished);
        bus.emit(
            &Signal::JobClosed {
                job: job_id,
                reason: &reason,
            },
            job.as_ref(),
        );
        info!("Job '{}' closed ({})", job.name(), reason);

        let stats = state.stats.finish(&reason);
        Ok(EngineReport {
            stats,
            finish_reason: reason,
        })
    }
}

/// Mutable state of one run.
struct RunState<'j> {
    job_id: JobId,
    job: &'j dyn Job,
    scheduler: Scheduler,
    stats: StatsCollector,
    close: Option<CloseReason>,
}

impl<'j> RunState<'j> {
    fn new(job_id: JobId, job: &'j dyn Job) -> Self {
        Self {
            job_id,
            job,
            scheduler: Scheduler::new(),
            stats: StatsCollector::start(),
            close: None,
        }
    }

    /// Deliver a signal and carry out whatever the observers asked for.
    fn emit(&mut self, bus: &mut SignalBus<'_>, signal: &Signal<'_>) -> SignalAck {
        let delivery = bus.emit(signal, self.job);
        self.apply(bus, delivery.commands);
        delivery.ack
    }

    fn schedule(&mut self, bus: &mut SignalBus<'_>, request: CrawlRequest) {
        let commands = self.schedule_one(bus, request);
        self.apply(bus, commands);
    }

    /// Announce and queue one request, returning the commands observers
    /// issued in response.
    fn schedule_one(
        &mut self,
        bus: &mut SignalBus<'_>,
        request: CrawlRequest,
    ) -> Vec<EngineCommand> {
        let delivery = bus.emit(
            &Signal::RequestScheduled {
                request: &request,
                job: self.job_id,
            },
            self.job,
        );

        let url = request.url.clone();
        if self.scheduler.enqueue(request) {
            self.stats.inc("scheduler/enqueued");
        } else {
            self.stats.inc("dupefilter/filtered");
            debug!("Filtered duplicate request: {}", url);
        }
        delivery.commands
    }

    fn apply(&mut self, bus: &mut SignalBus<'_>, commands: Vec<EngineCommand>) {
        let mut pending: VecDeque<EngineCommand> = commands.into();
        while let Some(command) = pending.pop_front() {
            match command {
                EngineCommand::Crawl(request) => {
                    let more = self.schedule_one(bus, request);
                    pending.extend(more);
                }
                EngineCommand::Close(reason) => {
                    if self.close.is_none() {
                        info!("Closing job: {}", reason);
                        self.close = Some(reason);
                    }
                }
            }
        }
    }
}
