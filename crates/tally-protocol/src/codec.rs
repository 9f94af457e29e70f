//! Codec for encoding and decoding Tally payloads.
//!
//! Payloads are JSON text, one command or event per WebSocket message.

use serde_json::Value;
use thiserror::Error;

use crate::command::{Command, CommandKind};
use crate::event::Event;

/// Maximum inbound payload size (64 KiB).
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload exceeds maximum size.
    #[error("Payload size {size} exceeds maximum {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Payload is not a JSON object with a `REQ` string.
    #[error("Payload has no REQ field")]
    MissingKind,

    /// `REQ` names a command this relay does not know.
    #[error("Unknown command kind: {0}")]
    UnknownKind(String),

    /// JSON decoding error, or missing/mistyped fields for a known kind.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Decode an inbound command, limited to [`MAX_PAYLOAD_SIZE`].
///
/// # Errors
///
/// See [`decode_command_with_limit`].
pub fn decode_command(payload: &str) -> Result<Command, ProtocolError> {
    decode_command_with_limit(payload, MAX_PAYLOAD_SIZE)
}

/// Decode an inbound command no larger than `limit` bytes.
///
/// An unknown `REQ` is reported separately from malformed JSON so callers
/// can tell a newer client apart from a broken one.
///
/// # Errors
///
/// Returns an error if the payload is too large, not JSON, has no known
/// `REQ`, or lacks fields required by its kind.
pub fn decode_command_with_limit(payload: &str, limit: usize) -> Result<Command, ProtocolError> {
    if payload.len() > limit {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            limit,
        });
    }

    let value: Value = serde_json::from_str(payload).map_err(ProtocolError::Decode)?;

    let tag = value
        .get("REQ")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingKind)?;

    if CommandKind::from_tag(tag).is_none() {
        return Err(ProtocolError::UnknownKind(tag.to_string()));
    }

    serde_json::from_value(value).map_err(ProtocolError::Decode)
}

/// Encode an inbound command. Used by clients and tests.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_command(command: &Command) -> Result<String, ProtocolError> {
    serde_json::to_string(command).map_err(ProtocolError::Encode)
}

/// Encode an outbound event.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_event(event: &Event) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(ProtocolError::Encode)
}

/// Decode an outbound event. Used by clients and tests.
///
/// # Errors
///
/// Returns an error if the payload is not a valid event.
pub fn decode_event(payload: &str) -> Result<Event, ProtocolError> {
    serde_json::from_str(payload).map_err(ProtocolError::Decode)
}
