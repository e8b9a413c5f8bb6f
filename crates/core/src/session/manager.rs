//! Entry point for running crawl sessions.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::adapter::EngineAdapter;
use super::orchestrator::CrawlSession;
use super::types::{CrawlError, CrawlParams, CrawlReport};
use crate::budget::{parse_max_requests, Budget};
use crate::config::CrawlConfig;
use crate::engine::{CrawlEngine, JobRegistry, SeedMode};
use crate::metrics;
use crate::request::build_seed_request;

/// Runs one bounded crawl session per call.
pub struct CrawlManager {
    adapter: EngineAdapter,
    config: Arc<CrawlConfig>,
}

impl CrawlManager {
    pub fn new(
        engine: Arc<dyn CrawlEngine>,
        registry: Arc<dyn JobRegistry>,
        config: Arc<CrawlConfig>,
    ) -> Self {
        let log_dir = config.job_logs.then(|| config.log_dir.clone());
        Self {
            adapter: EngineAdapter::new(engine, registry, log_dir),
            config,
        }
    }

    /// Names of the jobs that can be crawled.
    pub fn job_names(&self) -> Vec<String> {
        self.adapter.registry().names()
    }

    /// Run one crawl session to completion.
    ///
    /// Argument problems found before the engine starts are returned as
    /// errors. Problems found while it runs (an unknown callback, say) are
    /// carried in the report's `user_error`.
    pub async fn crawl(&self, params: CrawlParams) -> Result<CrawlReport, CrawlError> {
        let started = Instant::now();
        let job_name = params.job_name.clone();
        let result = self.run_session(params).await;
        record_outcome(&result, started.elapsed());

        match &result {
            Ok(report) => info!(
                job = %job_name,
                items = report.items.len(),
                dropped = report.items_dropped.len(),
                finish_reason = report.finish_reason().unwrap_or("unknown"),
                "Crawl finished"
            ),
            Err(e) => warn!(job = %job_name, "Crawl failed: {}", e),
        }
        result
    }

    async fn run_session(&self, params: CrawlParams) -> Result<CrawlReport, CrawlError> {
        let CrawlParams {
            job_name,
            request,
            max_requests,
            job_args,
            spider_start,
            validation,
        } = params;

        let max_requests = match max_requests {
            Some(raw) => parse_max_requests(&raw).map_err(CrawlError::InvalidArgument)?,
            None => None,
        };
        let seed = request
            .map(|params| build_seed_request(&job_name, &params, validation))
            .transpose()?;

        let seed_mode = if seed.is_some() && !spider_start {
            SeedMode::SingleInjected
        } else {
            SeedMode::Autonomous
        };
        let prepared = self.adapter.prepare(&job_name, job_args, seed_mode)?;

        let budget = Budget::new(
            max_requests,
            Duration::from_secs(self.config.timeout_limit),
        );
        let mut session = CrawlSession::new(
            job_name,
            prepared.job_id,
            seed,
            budget,
            self.config.debug,
        );

        self.adapter.run(prepared, &mut session).await?;
        Ok(session.report())
    }
}

fn record_outcome(result: &Result<CrawlReport, CrawlError>, elapsed: Duration) {
    let outcome = match result {
        Ok(report) if report.user_error.is_some() => "user_error",
        Ok(_) => "ok",
        Err(CrawlError::NotFound(_)) => "not_found",
        Err(CrawlError::InvalidArgument(_)) => "invalid_argument",
        Err(CrawlError::Engine(_)) => "engine_error",
    };
    metrics::SESSIONS_TOTAL.with_label_values(&[outcome]).inc();
    metrics::SESSION_DURATION
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());

    if let Ok(report) = result {
        metrics::ITEMS_SCRAPED.inc_by(report.items.len() as u64);
        metrics::ITEMS_DROPPED.inc_by(report.items_dropped.len() as u64);
        if let Some(reason @ ("timeout" | "max_requests_exceeded")) = report.finish_reason() {
            metrics::BUDGET_CLOSURES.with_label_values(&[reason]).inc();
        }
    }
}
