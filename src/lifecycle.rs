//! Lifecycle controller — wiring, phases, and shutdown.
//!
//! LIFECYCLE
//! =========
//! 1. Init: configuration validated into `Settings`
//! 2. Connecting: dial the source, then the relay (either failing is fatal)
//! 3. Subscribed: channel handshake written to the source
//! 4. Streaming: router loop runs until shutdown, close, or read error
//! 5. ShuttingDown: close source, then relay
//! 6. Terminated
//!
//! Shutdown is an explicit `watch` channel. The signal watcher owns the
//! trigger; the read loop observes the receiver and returns, after which
//! this controller is the only thing that closes either connection.

use std::fmt;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::{ConfigError, Endpoints, Settings};
use crate::relay::{ReconnectPolicy, RelayClient, RelayError};
use crate::router::{Router, RouterStats, StreamEnd};
use crate::source::{SourceError, SourceStream};

// =============================================================================
// ERROR
// =============================================================================

/// Startup failures. Anything past `Streaming` is handled in place.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

// =============================================================================
// PHASE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Connecting,
    Subscribed,
    Streaming,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Streaming => "streaming",
            Self::ShuttingDown => "shutting_down",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

// =============================================================================
// SHUTDOWN
// =============================================================================

/// Fires shutdown once. Dropping it without firing leaves the bridge running.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Resolve once shutdown has fired. Cancel safe.
    pub async fn wait(&mut self) {
        let orphaned = self.rx.wait_for(|fired| *fired).await.is_err();
        if orphaned {
            // Trigger dropped unfired: shutdown can no longer happen.
            std::future::pending::<()>().await;
        }
    }
}

#[must_use]
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Wait for Ctrl-C, or SIGTERM on unix.
///
/// # Errors
///
/// Returns the I/O error if a signal handler cannot be installed.
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    let terminate = {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        async move {
            sigterm.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        () = terminate => Ok(()),
    }
}

/// Exit status when a second signal arrives before teardown finishes.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Spawn the task that turns an OS signal into a shutdown.
///
/// The first signal fires `trigger`; a second exits the process immediately.
pub fn spawn_signal_watcher(trigger: ShutdownTrigger) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            error!(error = %e, "signal handler install failed");
            return;
        }
        info!("signal received, shutting down");
        trigger.fire();

        if wait_for_signal().await.is_ok() {
            error!("second signal received, exiting without teardown");
            std::process::exit(FORCED_EXIT_CODE);
        }
    })
}

// =============================================================================
// BRIDGE
// =============================================================================

/// How a bridge run ended once streaming had started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    pub end: StreamEnd,
    pub stats: RouterStats,
}

pub struct Bridge {
    endpoints: Endpoints,
    channel_name: String,
    router: Router,
    reconnect: ReconnectPolicy,
    phase: Phase,
}

impl Bridge {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            endpoints: settings.endpoints,
            channel_name: settings.channel_name,
            router: Router::new(settings.channel_id),
            reconnect: settings.reconnect,
            phase: Phase::Init,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, next: Phase) {
        info!(from = %self.phase, to = %next, "bridge: phase");
        self.phase = next;
    }

    /// Connect, subscribe, and stream until shutdown or the source ends.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] for any connect or subscribe failure. These
    /// are fatal; there is no retry at this layer.
    pub async fn run(&mut self, mut shutdown: Shutdown) -> Result<Termination, BridgeError> {
        self.advance(Phase::Connecting);
        info!(host = %self.endpoints.source_host, "bridge: connecting to source stream");
        let mut source = SourceStream::connect(&self.endpoints.source_url).await?;
        info!(url = %self.endpoints.relay_url, "bridge: connecting to relay");
        let mut relay = match RelayClient::connect(&self.endpoints.relay_url, self.reconnect).await {
            Ok(relay) => relay,
            Err(e) => {
                source.close().await;
                return Err(e.into());
            }
        };

        source.subscribe(&self.channel_name).await?;
        self.advance(Phase::Subscribed);
        info!(channel = %self.channel_name, target = %self.router.target_channel(), "bridge: subscribed");

        self.advance(Phase::Streaming);
        let (end, stats) = self.router.run(&mut source, &mut relay, &mut shutdown).await;

        self.advance(Phase::ShuttingDown);
        source.close().await;
        debug!(relay_connected = relay.is_connected(), "bridge: closing relay");
        relay.close().await;
        self.advance(Phase::Terminated);

        info!(?end, forwarded = stats.forwarded, dropped = stats.dropped, failed = stats.failed, "bridge: stopped");
        Ok(Termination { end, stats })
    }
}

#[cfg(test)]
#[path = "lifecycle_test.rs"]
mod tests;
