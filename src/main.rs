mod config;
mod lifecycle;
mod protocol;
mod relay;
mod router;
mod source;

#[cfg(test)]
mod test_support;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::lifecycle::{Bridge, BridgeError};

const DEFAULT_LOG_FILTER: &str = "info";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(log_filter()).init();

    // A missing .env is fine; real env vars and flags still apply.
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        tracing::debug!("rustls crypto provider already installed");
    }

    match run(Config::parse()).await {
        Ok(termination) => {
            tracing::info!(
                end = ?termination.end,
                forwarded = termination.stats.forwarded,
                "notecast exiting"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "notecast failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<lifecycle::Termination, BridgeError> {
    let settings = config.validate()?;
    let mut bridge = Bridge::new(settings);

    let (trigger, shutdown) = lifecycle::shutdown_channel();
    let watcher = lifecycle::spawn_signal_watcher(trigger);

    let result = bridge.run(shutdown).await;
    watcher.abort();
    if result.is_err() {
        tracing::error!(phase = %bridge.phase(), "bridge stopped during startup");
    }
    result
}

/// `RUST_LOG` when set and valid, otherwise `info`.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
