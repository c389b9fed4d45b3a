//! Message router — narrows inbound frames to notes and forwards them.
//!
//! DESIGN
//! ======
//! Three nested decode stages, each fail-soft:
//! 1. envelope: JSON object with a string `type`; only `"channel"` continues
//! 2. channel body: string `id` equal to the target channel, then string
//!    `type`; only `"note"` continues
//! 3. note body: string `text`
//!
//! A frame that fails any stage is logged and dropped. Nothing a single frame
//! contains can end the read loop; only the source closing, a read error, or
//! shutdown does.

use serde_json::Value;
use tracing::{Level, info, warn};

use crate::lifecycle::Shutdown;
use crate::protocol::{
    CHANNEL_NOTE, ChannelBody, ENVELOPE_CHANNEL, FIELD_BODY, FIELD_TYPE, NoteBody, SynthesisCommand,
};
use crate::relay::CommandSink;
use crate::source::FrameSource;

// =============================================================================
// DROP REASONS
// =============================================================================

/// Why a frame was discarded. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum DropReason {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("unknown message type")]
    MissingEnvelopeType,
    #[error("unknown message type: {0}")]
    UnknownEnvelopeType(String),
    #[error("channel message has no body")]
    MissingChannelBody,
    #[error("channel message has no id")]
    MissingChannelId,
    #[error("not the target channel: {0}")]
    OtherChannel(String),
    #[error("channel message type is missing")]
    MissingChannelType,
    #[error("unknown channel message type: {0}")]
    UnknownChannelType(String),
    #[error("note message has no body")]
    MissingNoteBody,
    #[error("note has no text")]
    MissingNoteText,
}

impl DropReason {
    /// Drops that are routine multiplexed traffic rather than malformed input.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::UnknownEnvelopeType(_) | Self::OtherChannel(_) | Self::UnknownChannelType(_))
    }

    /// Level the drop is logged at. Never below `INFO`, the default filter.
    #[must_use]
    pub fn level(&self) -> Level {
        if self.is_expected() { Level::INFO } else { Level::WARN }
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// What happened to one inbound frame.
#[derive(Debug)]
pub enum Outcome {
    Forwarded,
    Dropped(DropReason),
    SubmitFailed,
}

/// Why the read loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Shutdown,
    Closed,
    ReadError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub forwarded: u64,
    pub dropped: u64,
    pub failed: u64,
}

impl RouterStats {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Forwarded => self.forwarded += 1,
            Outcome::Dropped(_) => self.dropped += 1,
            Outcome::SubmitFailed => self.failed += 1,
        }
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Routes frames for exactly one channel subscription.
#[derive(Debug, Clone)]
pub struct Router {
    target_channel: String,
}

impl Router {
    #[must_use]
    pub fn new(target_channel: impl Into<String>) -> Self {
        Self { target_channel: target_channel.into() }
    }

    #[must_use]
    pub fn target_channel(&self) -> &str {
        &self.target_channel
    }

    /// Decode one raw frame into the command it should produce.
    ///
    /// # Errors
    ///
    /// Returns the [`DropReason`] of the first stage that rejected the frame.
    pub fn dispatch(&self, raw: &[u8]) -> Result<SynthesisCommand, DropReason> {
        let envelope: Value = serde_json::from_slice(raw)?;
        if !envelope.is_object() {
            return Err(DropReason::NotAnObject);
        }

        match envelope.get(FIELD_TYPE).and_then(Value::as_str) {
            None => Err(DropReason::MissingEnvelopeType),
            Some(ENVELOPE_CHANNEL) => self.dispatch_channel(&envelope),
            Some(other) => Err(DropReason::UnknownEnvelopeType(other.to_owned())),
        }
    }

    fn dispatch_channel(&self, envelope: &Value) -> Result<SynthesisCommand, DropReason> {
        let body = envelope
            .get(FIELD_BODY)
            .filter(|body| body.is_object())
            .ok_or(DropReason::MissingChannelBody)?;
        let channel = ChannelBody::narrow(body).ok_or(DropReason::MissingChannelId)?;

        if channel.id != self.target_channel {
            return Err(DropReason::OtherChannel(channel.id.to_owned()));
        }

        match channel.kind {
            None => Err(DropReason::MissingChannelType),
            Some(CHANNEL_NOTE) => dispatch_note(&channel),
            Some(other) => Err(DropReason::UnknownChannelType(other.to_owned())),
        }
    }

    /// Route one frame and submit the resulting command, logging every drop.
    pub async fn handle<R>(&self, raw: &[u8], relay: &mut R) -> Outcome
    where
        R: CommandSink + ?Sized,
    {
        let command = match self.dispatch(raw) {
            Ok(command) => command,
            Err(reason) => {
                if reason.level() == Level::WARN {
                    warn!(%reason, "router: frame dropped");
                } else {
                    info!(%reason, "router: frame dropped");
                }
                return Outcome::Dropped(reason);
            }
        };

        info!(text = %command.text, "new post");

        match relay.submit(&command).await {
            Ok(()) => Outcome::Forwarded,
            Err(error) => {
                warn!(%error, "router: relay submit failed");
                Outcome::SubmitFailed
            }
        }
    }

    /// Read frames until the source ends, fails, or shutdown fires.
    pub async fn run<S, R>(&self, source: &mut S, relay: &mut R, shutdown: &mut Shutdown) -> (StreamEnd, RouterStats)
    where
        S: FrameSource + ?Sized,
        R: CommandSink + ?Sized,
    {
        let mut stats = RouterStats::default();
        loop {
            let next = tokio::select! {
                () = shutdown.wait() => return (StreamEnd::Shutdown, stats),
                next = source.next_frame() => next,
            };

            let raw = match next {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    info!("router: source stream closed");
                    return (StreamEnd::Closed, stats);
                }
                Err(error) => {
                    warn!(%error, "router: source read failed");
                    return (StreamEnd::ReadError, stats);
                }
            };

            // A submit can block on a stuck relay or a reconnect backoff.
            let outcome = tokio::select! {
                () = shutdown.wait() => return (StreamEnd::Shutdown, stats),
                outcome = self.handle(&raw, relay) => outcome,
            };
            stats.record(&outcome);
        }
    }
}

fn dispatch_note(channel: &ChannelBody<'_>) -> Result<SynthesisCommand, DropReason> {
    let body = channel
        .body
        .filter(|body| body.is_object())
        .ok_or(DropReason::MissingNoteBody)?;
    let note = NoteBody::narrow(body).ok_or(DropReason::MissingNoteText)?;
    Ok(SynthesisCommand::talk(note.text))
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
