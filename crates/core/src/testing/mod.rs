//! Testing utilities and mock implementations.
//!
//! These let crawl sessions run end to end without touching the network.
//!
//! # Example
//!
//! ```rust,ignore
//! use crawlrt_core::testing::{MockDownloader, ScriptedJobFactory};
//!
//! let downloader = MockDownloader::new();
//! downloader.add_page("http://x/", 200, &fixtures::page_html("Home", &[])).await;
//!
//! let factory = ScriptedJobFactory::new("test")
//!     .on_page("http://x/", |p| p.item(json!({"name": "home"})));
//! // Register the factory and build an Engine over the downloader...
//! ```

mod mock_downloader;
mod mock_engine;
mod scripted_job;

pub use mock_downloader::{MockDownloader, MockPage, RecordedFetch};
pub use mock_engine::{FailingEngine, ForeignSignalEngine};
pub use scripted_job::{PageScript, ScriptedJob, ScriptedJobFactory};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;

    use crate::config::{CrawlConfig, EngineConfig};
    use crate::engine::{Engine, StaticJobRegistry};
    use crate::session::CrawlManager;

    use super::{MockDownloader, ScriptedJobFactory};

    /// A minimal HTML page with a title and one anchor per link.
    pub fn page_html(title: &str, links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|href| format!("<a href=\"{}\">{}</a>\n", href, href))
            .collect();
        format!(
            "<html><head><title>{}</title></head><body>\n{}</body></html>",
            title, anchors
        )
    }

    /// Crawl settings for tests: short timeout, no job log files.
    pub fn crawl_config(timeout_limit: u64, debug: bool) -> CrawlConfig {
        CrawlConfig {
            timeout_limit,
            debug,
            job_logs: false,
            ..CrawlConfig::default()
        }
    }

    /// Engine settings for tests: fast idle polling.
    pub fn engine_config() -> EngineConfig {
        EngineConfig {
            idle_interval_ms: 10,
            ..EngineConfig::default()
        }
    }

    /// A manager running the given scripted jobs over `downloader`.
    pub fn manager(
        downloader: MockDownloader,
        jobs: Vec<ScriptedJobFactory>,
        config: CrawlConfig,
    ) -> CrawlManager {
        let mut registry = StaticJobRegistry::new();
        for job in jobs {
            registry.register(Arc::new(job));
        }
        let engine = Engine::new(downloader, &engine_config());
        CrawlManager::new(Arc::new(engine), Arc::new(registry), Arc::new(config))
    }
}
