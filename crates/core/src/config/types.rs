use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    9080
}

/// Per-session crawl settings shared by every session the server runs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlConfig {
    /// Wall-clock budget of one session, in seconds.
    #[serde(default = "default_timeout_limit")]
    pub timeout_limit: u64,
    /// Include job error reports in crawl results.
    #[serde(default = "default_debug")]
    pub debug: bool,
    /// Directory holding per-job log files and the server log file.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Write a log file per job run under `log_dir/<job>/`.
    #[serde(default = "default_job_logs")]
    pub job_logs: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            timeout_limit: default_timeout_limit(),
            debug: default_debug(),
            log_dir: default_log_dir(),
            job_logs: default_job_logs(),
        }
    }
}

fn default_timeout_limit() -> u64 {
    1000
}

fn default_debug() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_job_logs() -> bool {
    true
}

/// Settings of the reference crawl engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Maximum downloads in flight for one job run.
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,
    /// Per-request download timeout in seconds.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// How long the engine waits before re-firing the idle signal when an
    /// observer asked it to stay open without scheduling anything.
    #[serde(default = "default_idle_interval")]
    pub idle_interval_ms: u64,
    /// Items missing any of these fields are dropped.
    #[serde(default)]
    pub required_item_fields: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrent_requests: default_concurrent_requests(),
            download_timeout_secs: default_download_timeout(),
            user_agent: default_user_agent(),
            idle_interval_ms: default_idle_interval(),
            required_item_fields: Vec::new(),
        }
    }
}

fn default_concurrent_requests() -> usize {
    8
}

fn default_download_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("crawlrt/{}", env!("CARGO_PKG_VERSION"))
}

fn default_idle_interval() -> u64 {
    100
}

/// Server log output
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Daily-rotated server log file name, relative to `crawl.log_dir`.
    /// Logs go to stderr only when unset.
    #[serde(default)]
    pub file: Option<String>,
}
