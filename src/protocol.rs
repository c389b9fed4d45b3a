//! Wire model for both sockets.
//!
//! DESIGN
//! ======
//! The streaming API multiplexes many unrelated frame shapes over one socket,
//! so inbound frames stay as `serde_json::Value` and are narrowed field by
//! field. Only the shapes the bridge acts on get typed views here:
//! `ChannelBody` and `NoteBody`. Outbound frames are plain serde structs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Discriminator key shared by envelopes and channel bodies.
pub const FIELD_TYPE: &str = "type";

/// Nested payload key shared by envelopes and channel bodies.
pub const FIELD_BODY: &str = "body";

/// Channel connection identifier inside a channel body.
pub const FIELD_ID: &str = "id";

/// Plain-text content of a note.
pub const FIELD_TEXT: &str = "text";

/// Envelope type carrying per-channel traffic.
pub const ENVELOPE_CHANNEL: &str = "channel";

/// Channel message type carrying a posted note.
pub const CHANNEL_NOTE: &str = "note";

/// Envelope type of the outbound subscription handshake.
pub const ENVELOPE_CONNECT: &str = "connect";

/// Relay command that speaks a text.
pub const COMMAND_TALK: &str = "Talk";

/// Relay sentinel meaning "use the relay's configured default".
pub const RELAY_DEFAULT: i32 = -1;

// =============================================================================
// OUTBOUND: SOURCE
// =============================================================================

/// Control frame that subscribes the socket to one channel.
///
/// Serializes as `{"type":"connect","body":{"channel":"<name>"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    body: SubscribeBody<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct SubscribeBody<'a> {
    channel: &'a str,
}

impl<'a> SubscribeFrame<'a> {
    #[must_use]
    pub fn new(channel: &'a str) -> Self {
        Self { kind: ENVELOPE_CONNECT, body: SubscribeBody { channel } }
    }
}

// =============================================================================
// OUTBOUND: RELAY
// =============================================================================

/// A request telling the relay to speak `text`.
///
/// Field names go over the wire in `PascalCase` (`Command`, `Text`,
/// `VoiceType`, ...), which is what the TalkAPI socket expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SynthesisCommand {
    pub command: String,
    pub text: String,
    pub voice_type: i32,
    pub volume: i32,
    pub speed: i32,
    pub tone: i32,
    pub encoding: i32,
}

impl SynthesisCommand {
    /// Build a `Talk` command with default voice, volume, speed and tone.
    #[must_use]
    pub fn talk(text: impl Into<String>) -> Self {
        Self {
            command: COMMAND_TALK.to_owned(),
            text: text.into(),
            voice_type: 0,
            volume: RELAY_DEFAULT,
            speed: RELAY_DEFAULT,
            tone: RELAY_DEFAULT,
            encoding: 0,
        }
    }
}

// =============================================================================
// INBOUND VIEWS
// =============================================================================

/// Borrowed view of `envelope.body` for `"channel"` envelopes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelBody<'a> {
    pub id: &'a str,
    /// Raw `type` field; read lazily so the id check can run first.
    pub kind: Option<&'a str>,
    pub body: Option<&'a Value>,
}

impl<'a> ChannelBody<'a> {
    /// Narrow a channel body. Returns `None` when `id` is absent or not a string.
    #[must_use]
    pub fn narrow(value: &'a Value) -> Option<Self> {
        let id = value.get(FIELD_ID).and_then(Value::as_str)?;
        Some(Self {
            id,
            kind: value.get(FIELD_TYPE).and_then(Value::as_str),
            body: value.get(FIELD_BODY),
        })
    }
}

/// Borrowed view of a note payload. Every other field is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteBody<'a> {
    pub text: &'a str,
}

impl<'a> NoteBody<'a> {
    #[must_use]
    pub fn narrow(value: &'a Value) -> Option<Self> {
        value
            .get(FIELD_TEXT)
            .and_then(Value::as_str)
            .map(|text| Self { text })
    }
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
