//! Match replay - scores a recorded match from a JSON script
//!
//! Usage: `match-replay [SCRIPT]`. Without an argument the script is read
//! from `REPLAY_PATH`. The final report is printed to stdout as JSON.

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use match_tracker::config::{Config, ConfigError, LogFormat};
use match_tracker::replay::{self, ReplayScript};
use match_tracker::util::time::Timer;
use match_tracker::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.log_format);

    let path = match std::env::args_os().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => config
            .replay_path
            .clone()
            .ok_or(ConfigError::Missing("REPLAY_PATH"))?,
    };

    info!("Replaying {}", path.display());
    let timer = Timer::new();

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let script: ReplayScript = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid replay script", path.display()))?;

    let state = AppState::new(config);
    let report = replay::run(&state, script).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(elapsed_ms = timer.elapsed_ms(), "Replay finished");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    // Logs go to stderr so stdout carries only the report
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
