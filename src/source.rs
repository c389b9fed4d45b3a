//! Source stream client — the Misskey streaming socket.
//!
//! The socket is dialed once with the API key in the query string, sent a
//! single channel subscription, and then read until it closes or fails.
//! Reading is exposed through the `FrameSource` seam so the router loop can
//! be driven by an in-memory source in tests.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::protocol::SubscribeFrame;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("channel subscribe failed: {0}")]
    Subscribe(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("subscribe frame encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("source read failed: {0}")]
    Read(Box<tokio_tungstenite::tungstenite::Error>),
}

// =============================================================================
// SEAM
// =============================================================================

/// Anything that yields raw inbound frames one at a time.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame payload.
    ///
    /// `Ok(None)` is end of stream. Implementations must be cancel safe: the
    /// router drops this future when shutdown wins the race.
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, SourceError>;
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct SourceStream {
    stream: WsStream,
}

impl SourceStream {
    /// Dial `url` (`wss://<host>/streaming?i=<key>`).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Connect`] when the TCP/TLS dial or the
    /// websocket upgrade fails.
    pub async fn connect(url: &str) -> Result<Self, SourceError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|error| SourceError::Connect(Box::new(error)))?;
        Ok(Self { stream })
    }

    /// Send the one-time channel subscription frame.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Subscribe`] when the frame cannot be written.
    pub async fn subscribe(&mut self, channel: &str) -> Result<(), SourceError> {
        let payload = serde_json::to_string(&SubscribeFrame::new(channel))?;
        self.stream
            .send(Message::Text(payload.into()))
            .await
            .map_err(|error| SourceError::Subscribe(Box::new(error)))
    }

    /// Close the socket. Errors from an already-dead socket are ignored.
    pub async fn close(&mut self) {
        if let Err(error) = self.stream.close(None).await {
            debug!(%error, "source close after failure");
        }
    }
}

#[async_trait]
impl FrameSource for SourceStream {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        loop {
            let Some(message) = self.stream.next().await else {
                return Ok(None);
            };
            match message.map_err(|error| SourceError::Read(Box::new(error)))? {
                Message::Text(text) => return Ok(Some(text.as_str().as_bytes().to_vec())),
                Message::Binary(bytes) => return Ok(Some(bytes.to_vec())),
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "source_test.rs"]
mod tests;
