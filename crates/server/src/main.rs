use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawlrt_core::{
    builtin_registry, load_config_with, validate_config, Config, CrawlManager, Engine,
    JobLogLayer, ReqwestDownloader,
};
use crawlrt_server::{api::create_router, state::AppState};

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "CRAWLRT_CONFIG";

/// Configuration file used when none is given and it exists.
const DEFAULT_CONFIG: &str = "config.toml";

/// HTTP API that runs one bounded crawl job per request
#[derive(Parser, Debug)]
#[command(name = "crawlrt")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// IP address to bind to
    #[arg(short, long)]
    ip: Option<std::net::IpAddr>,

    /// Override a configuration key, e.g. `-s crawl.timeout_limit=30`
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    settings: Vec<(String, String)>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

impl Args {
    fn overrides(&self) -> Vec<(String, String)> {
        let mut overrides = self.settings.clone();
        if let Some(port) = self.port {
            overrides.push(("server.port".to_string(), port.to_string()));
        }
        if let Some(ip) = self.ip {
            overrides.push(("server.host".to_string(), ip.to_string()));
        }
        overrides
    }

    fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG);
                default.exists().then_some(default)
            })
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = args.config_path();
    let config = load_config_with(config_path.as_deref(), &args.overrides())
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let _log_guard = init_logging(&config)?;

    match &config_path {
        Some(path) => info!("Configuration loaded from {:?}", path),
        None => info!("No configuration file, using defaults"),
    }
    info!(
        "Session timeout: {}s, debug: {}, job logs: {}",
        config.crawl.timeout_limit, config.crawl.debug, config.crawl.job_logs
    );

    let downloader =
        ReqwestDownloader::new(&config.engine).context("Failed to create HTTP downloader")?;
    let engine = Engine::new(downloader, &config.engine);
    let registry = builtin_registry();
    let manager = CrawlManager::new(
        Arc::new(engine),
        Arc::new(registry),
        Arc::new(config.crawl.clone()),
    );
    info!("Available jobs: {}", manager.job_names().join(", "));

    let state = Arc::new(AppState::new(manager));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Install the global subscriber: stderr, the optional server log file and
/// per-job log files.
///
/// The returned guard flushes the server log file when dropped.
fn init_logging(config: &Config) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    let (file_layer, guard) = match &config.logging.file {
        Some(name) => {
            std::fs::create_dir_all(&config.crawl.log_dir).with_context(|| {
                format!("Failed to create log directory {:?}", config.crawl.log_dir)
            })?;
            let appender = tracing_appender::rolling::daily(&config.crawl.log_dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(JobLogLayer::new())
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
