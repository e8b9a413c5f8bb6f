//! Bounded crawl sessions.
//!
//! [`CrawlManager::crawl`] runs one job instance per call: it builds the seed
//! request, resolves the job through the [`EngineAdapter`], attaches a
//! [`CrawlSession`] to the engine run and returns the session's
//! [`CrawlReport`].

mod adapter;
mod joblog;
mod manager;
mod orchestrator;
mod types;

pub use adapter::{EngineAdapter, PreparedJob};
pub use joblog::{job_log_path, JobLogHook, JobLogLayer, JOB_ID_FIELD};
pub use manager::CrawlManager;
pub use orchestrator::CrawlSession;
pub use types::*;
