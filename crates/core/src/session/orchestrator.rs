//! The per-session state machine.
//!
//! A [`CrawlSession`] observes one job instance through the signal bus. On
//! the first idle signal it injects the seed request, it enforces the
//! budget on every scheduling event, and it collects results until the
//! engine run ends. Handlers never fail: problems found while the engine is
//! running become session state and end up in the report.

use serde_json::Value;
use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::types::{CrawlReport, SessionState, UserError};
use crate::aggregator::ResultAggregator;
use crate::budget::{Budget, BudgetEnforcer};
use crate::engine::{JobId, Signal, SignalAck, SignalContext, SignalKind, SignalObserver};
use crate::request::SeedRequest;

const SESSION_SIGNALS: &[SignalKind] = &[
    SignalKind::ItemScraped,
    SignalKind::ItemDropped,
    SignalKind::RequestScheduled,
    SignalKind::JobIdle,
    SignalKind::JobError,
];

/// One bounded crawl of one job instance.
#[derive(Debug)]
pub struct CrawlSession {
    job_name: String,
    job_id: JobId,
    seed: Option<SeedRequest>,
    budget: BudgetEnforcer,
    state: SessionState,
    results: ResultAggregator,
    user_error: Option<UserError>,
    request_scheduled: bool,
    stats: BTreeMap<String, Value>,
}

impl CrawlSession {
    pub fn new(
        job_name: impl Into<String>,
        job_id: JobId,
        seed: Option<SeedRequest>,
        budget: Budget,
        debug: bool,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            job_id,
            seed,
            budget: BudgetEnforcer::new(budget, Instant::now()),
            state: SessionState::Created,
            results: ResultAggregator::new(job_id, debug),
            user_error: None,
            request_scheduled: false,
            stats: BTreeMap::new(),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the seed request has been handed to the engine.
    pub fn request_scheduled(&self) -> bool {
        self.request_scheduled
    }

    pub fn user_error(&self) -> Option<&UserError> {
        self.user_error.as_ref()
    }

    pub fn scheduled_count(&self) -> u32 {
        self.budget.scheduled_count()
    }

    /// Record the end of the engine run.
    pub fn finish(&mut self, stats: BTreeMap<String, Value>) {
        self.stats = stats;
        self.state = SessionState::Finished;
    }

    /// Build the result. Calling it repeatedly yields identical reports.
    pub fn report(&self) -> CrawlReport {
        CrawlReport {
            items: self.results.items().to_vec(),
            items_dropped: self.results.dropped().to_vec(),
            stats: self.stats.clone(),
            job_name: self.job_name.clone(),
            user_error: self.user_error.clone(),
            errors: self
                .results
                .debug()
                .then(|| self.results.errors().to_vec()),
        }
    }

    fn on_idle(&mut self, ctx: &mut SignalContext<'_>) -> SignalAck {
        if self.request_scheduled || self.user_error.is_some() {
            return SignalAck::Continue;
        }
        let Some(seed) = self.seed.clone() else {
            return SignalAck::Continue;
        };

        self.state = SessionState::Seeding;
        let job = ctx.job();
        let handlers = [
            ("callback", Some(&seed.callback), job.has_callback(&seed.callback)),
            (
                "errback",
                seed.errback.as_ref(),
                seed.errback.as_deref().map_or(true, |name| job.has_errback(name)),
            ),
        ];
        for (kind, name, known) in handlers {
            let Some(name) = name else { continue };
            if !known {
                let message = format!(
                    "Invalid job {} '{}' for job '{}'",
                    kind, name, self.job_name
                );
                warn!("{}", message);
                self.user_error = Some(UserError::bad_request(message));
                self.state = SessionState::Created;
                return SignalAck::Continue;
            }
        }

        let mut request = seed.request.with_callback(seed.callback);
        request.errback = seed.errback;
        let request = ctx.job().modify_realtime_request(request);
        info!(url = %request.url, "Injecting seed request");

        ctx.crawl(request);
        self.request_scheduled = true;
        self.state = SessionState::Running;
        SignalAck::DontClose
    }

    fn on_request_scheduled(&mut self, ctx: &mut SignalContext<'_>) {
        let over_count = self.budget.on_request_scheduled();
        let over_time = self.budget.on_tick(Instant::now());
        for reason in [over_count, over_time].into_iter().flatten() {
            info!(
                scheduled = self.budget.scheduled_count(),
                "Session budget exhausted: {}", reason
            );
            ctx.close_job(reason);
        }
    }
}

impl SignalObserver for CrawlSession {
    fn interests(&self) -> &[SignalKind] {
        SESSION_SIGNALS
    }

    fn on_signal(&mut self, signal: &Signal<'_>, ctx: &mut SignalContext<'_>) -> SignalAck {
        if signal.job() != Some(self.job_id) {
            debug!(signal = ?signal.kind(), "Ignoring signal of another job");
            return SignalAck::Continue;
        }
        if self.state == SessionState::Finished {
            return SignalAck::Continue;
        }
        if self.state == SessionState::Created && self.seed.is_none() {
            self.state = SessionState::Running;
        }

        match *signal {
            Signal::JobIdle { .. } => return self.on_idle(ctx),
            Signal::RequestScheduled { .. } => self.on_request_scheduled(ctx),
            Signal::ItemScraped { item, job, .. } => self.results.on_item_scraped(job, item),
            Signal::ItemDropped {
                item,
                response,
                reason,
                job,
            } => self.results.on_item_dropped(job, item, reason, response),
            Signal::JobError { failure, job } => self.results.on_job_error(job, failure),
            Signal::EngineOpened | Signal::JobOpened { .. } | Signal::JobClosed { .. } => {}
        }
        SignalAck::Continue
    }
}
