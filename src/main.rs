use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use lumberjack::config::Config;
use lumberjack::engine::LoggingEngine;
use lumberjack::logging;
use lumberjack::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "lumberjack")]
#[command(about = "Network logging service with time-bucketed log files", long_about = None)]
struct Args {
    /// Path to the TOML configuration file (default: ~/.lumberjack/config.toml)
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_or_default(args.config.as_deref())?;

    // Reject bad settings before anything is created on disk
    config.validate().context("Invalid configuration")?;

    // Initialize diagnostics BEFORE any tracing calls
    let guard = logging::init_logging(&config.diagnostics)?;
    if let Some(path) = &guard.path {
        tracing::info!("Diagnostics written to: {}", path.display());
    }

    let engine = LoggingEngine::from_config(&config).context("Failed to start logging engine")?;
    let state = AppState::new(engine);

    let handle = server::start(config.socket_addr(), state).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    handle.shutdown().await
}
