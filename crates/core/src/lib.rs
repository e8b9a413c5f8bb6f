pub mod aggregator;
pub mod budget;
pub mod config;
pub mod engine;
pub mod jobs;
pub mod metrics;
pub mod request;
pub mod session;
pub mod testing;

pub use aggregator::{DroppedItem, ResultAggregator};
pub use budget::{parse_max_requests, Budget, BudgetEnforcer};
pub use config::{
    load_config, load_config_from_str, load_config_with, validate_config, Config, ConfigError,
    CrawlConfig, EngineConfig, LoggingConfig, ServerConfig,
};
pub use engine::{
    CloseReason, CrawlEngine, Engine, EngineError, Item, Job, JobFactory, JobId, JobRegistry,
    ReqwestDownloader, SeedMode, StaticJobRegistry,
};
pub use jobs::{builtin_registry, PageJobFactory};
pub use request::{build_seed_request, CrawlRequest, RequestError, SeedRequest, Validation};
pub use session::{
    CrawlError, CrawlManager, CrawlParams, CrawlReport, CrawlSession, JobLogLayer, UserError,
};
