//! Crawl engine abstraction and the reference engine.
//!
//! An engine runs one job instance at a time per [`EngineRun`], emitting
//! [`Signal`]s to the observers connected to the run's [`SignalBus`].
//! Observers steer the run through [`SignalContext`] commands and the
//! [`SignalAck`] they return.

mod downloader;
mod job;
mod pipeline;
mod runner;
mod scheduler;
mod signals;
mod stats;
mod types;

pub use downloader::{DownloadError, Downloader, ReqwestDownloader};
pub use job::{
    Job, JobArgs, JobFactory, JobInitError, JobOutput, JobRegistry, StaticJobRegistry,
};
pub use pipeline::{DropItem, ItemPipeline, RequiredFieldsPipeline};
pub use runner::{CrawlEngine, Engine, EngineRun};
pub use scheduler::{fingerprint, Scheduler};
pub use signals::{
    Delivery, EngineCommand, Signal, SignalAck, SignalBus, SignalContext, SignalKind,
    SignalObserver,
};
pub use stats::StatsCollector;
pub use types::*;
