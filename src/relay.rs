//! Relay client — the BouyomiChan TalkAPI socket.
//!
//! DESIGN
//! ======
//! Commands are written fire-and-forget: one JSON text frame per command,
//! no acknowledgement. A failed write is returned to the caller, which logs
//! it and keeps reading the source.
//!
//! TRADE-OFFS
//! ==========
//! Reconnecting is opt-in. With the policy disabled a dead relay stays dead
//! until the process is restarted. With it enabled the failed command is
//! resent at most once after a successful redial; nothing is queued.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::SinkExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::protocol::SynthesisCommand;
use crate::source::WsStream;

pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("command encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("relay send failed: {0}")]
    Send(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("relay connection is closed")]
    Closed,
}

// =============================================================================
// SEAM
// =============================================================================

/// Destination for synthesis commands.
#[async_trait]
pub trait CommandSink: Send {
    async fn submit(&mut self, command: &SynthesisCommand) -> Result<(), RelayError>;
}

// =============================================================================
// RECONNECT POLICY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ReconnectPolicy {
    /// Never redial; send failures are only reported.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: 0,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }

    /// Redial up to `max_attempts` times with 1s doubling backoff capped at 10s.
    #[must_use]
    pub fn retrying(max_attempts: u32) -> Self {
        Self { enabled: max_attempts > 0, max_attempts, ..Self::disabled() }
    }

    /// Delay before dial number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1_u32 << shift)
            .min(self.max_backoff)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct RelayClient {
    url: String,
    stream: Option<WsStream>,
    policy: ReconnectPolicy,
}

impl RelayClient {
    /// Dial `url` (`ws://<host>/TalkAPI/`). No handshake payload is sent.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connect`] when the dial or upgrade fails.
    pub async fn connect(url: &str, policy: ReconnectPolicy) -> Result<Self, RelayError> {
        let stream = dial(url).await?;
        Ok(Self { url: url.to_owned(), stream: Some(stream), policy })
    }

    /// A client whose socket is already gone, as after a failed send.
    #[cfg(test)]
    pub(crate) fn disconnected(url: &str, policy: ReconnectPolicy) -> Self {
        Self { url: url.to_owned(), stream: None, policy }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the socket if it is still open.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(error) = stream.close(None).await {
                debug!(%error, "relay close after failure");
            }
        }
    }

    async fn send_once(&mut self, payload: &str) -> Result<(), RelayError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(RelayError::Closed);
        };
        let result = stream
            .send(Message::Text(payload.to_owned().into()))
            .await
            .map_err(|error| RelayError::Send(Box::new(error)));
        if result.is_err() {
            self.stream = None;
        }
        result
    }

    async fn redial(&mut self) -> Result<(), RelayError> {
        let mut last = RelayError::Closed;
        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.backoff(attempt);
            warn!(attempt, max = self.policy.max_attempts, ?delay, "relay: reconnecting");
            tokio::time::sleep(delay).await;
            match dial(&self.url).await {
                Ok(stream) => {
                    info!(attempt, "relay: reconnected");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(error) => {
                    warn!(attempt, %error, "relay: reconnect failed");
                    last = error;
                }
            }
        }
        Err(last)
    }
}

#[async_trait]
impl CommandSink for RelayClient {
    async fn submit(&mut self, command: &SynthesisCommand) -> Result<(), RelayError> {
        let payload = serde_json::to_string(command)?;
        let error = match self.send_once(&payload).await {
            Ok(()) => return Ok(()),
            Err(error) => error,
        };
        if !self.policy.enabled {
            return Err(error);
        }

        warn!(%error, "relay: send failed");
        self.redial().await?;
        self.send_once(&payload).await
    }
}

async fn dial(url: &str) -> Result<WsStream, RelayError> {
    let (stream, _) = connect_async(url)
        .await
        .map_err(|error| RelayError::Connect(Box::new(error)))?;
    Ok(stream)
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
