//! # Heartbeat Relay
//!
//! Daemon entry point: parse the command line, load the configuration, set
//! up logging and run the relay until a task fails or Ctrl+C.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use heartbeat_relay::config::{Config, LoggingConfig};
use heartbeat_relay::supervisor::Relay;

/// File name prefix of the daily log files
const LOG_FILE_PREFIX: &str = "heartbeat-relay.log";

#[derive(Parser, Debug)]
#[command(name = "heartbeat-relay", version, about = "Heartbeat to PostgreSQL relay with GPS tagging")]
struct Args {
    /// Path to the TOML configuration file
    config: PathBuf,
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` directives win over the configured level. With a log
/// directory set, output goes to a daily file through a non-blocking
/// writer whose guard must outlive the program.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if config.directory.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

/// Main entry point for the relay
///
/// # Control Flow
///
/// 1. Load and validate the configuration (errors end the process before
///    logging is set up and are printed to stderr)
/// 2. Initialize logging
/// 3. Start the relay: queue, gpsd, channel sockets, tasks
/// 4. Run until a task ends (exit status 1) or Ctrl+C (exit status 0)
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("could not load configuration from {}", args.config.display()))?;

    let _guard = init_logging(&config.logging);

    info!("Heartbeat Relay v{} starting...", env!("CARGO_PKG_VERSION"));
    config.log_summary();

    let relay = Relay::start(&config).await.context("could not start relay")?;

    tokio::select! {
        result = relay.run() => {
            result.context("relay stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}
