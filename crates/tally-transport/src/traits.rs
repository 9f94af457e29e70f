//! Transport abstraction traits for Tally.
//!
//! A connection is split into a [`MessageSink`] and a [`MessageStream`] so
//! one task can write while another waits for the peer, the way a split
//! WebSocket is used.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Identifies one accepted connection in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a random connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// The write half of a connection.
#[async_trait]
pub trait MessageSink: Send {
    /// Send one text payload.
    async fn send(&mut self, payload: String) -> Result<(), TransportError>;

    /// Close the connection gracefully. Closing twice is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the connection is known to be closed or broken.
    fn is_closed(&self) -> bool;
}

/// The read half of a connection.
#[async_trait]
pub trait MessageStream: Send {
    /// Wait for the next text payload.
    ///
    /// Returns `None` if the connection is closed cleanly.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;
}

/// An accepted connection to a single client.
pub trait Connection: Send + 'static {
    type Sink: MessageSink + 'static;
    type Stream: MessageStream + 'static;

    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Split into independently usable halves.
    fn split(self) -> (Self::Sink, Self::Stream);
}
