//! Prometheus metrics for crawl sessions.
//!
//! Registration happens in the server, which owns the registry.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

/// Sessions total by outcome.
pub static SESSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("crawlrt_sessions_total", "Total crawl sessions"),
        &["outcome"], // "ok", "user_error", "not_found", "invalid_argument", "engine_error"
    )
    .unwrap()
});

/// Session duration in seconds.
pub static SESSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "crawlrt_session_duration_seconds",
            "Duration of crawl sessions",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Items returned to callers.
pub static ITEMS_SCRAPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("crawlrt_items_scraped_total", "Total items scraped").unwrap()
});

/// Items dropped by pipelines.
pub static ITEMS_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("crawlrt_items_dropped_total", "Total items dropped").unwrap()
});

/// Sessions closed by their budget, by reason.
pub static BUDGET_CLOSURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "crawlrt_budget_closures_total",
            "Total sessions stopped by their request or time budget",
        ),
        &["reason"], // "timeout", "max_requests_exceeded"
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SESSIONS_TOTAL.clone()),
        Box::new(SESSION_DURATION.clone()),
        Box::new(ITEMS_SCRAPED.clone()),
        Box::new(ITEMS_DROPPED.clone()),
        Box::new(BUDGET_CLOSURES.clone()),
    ]
}
