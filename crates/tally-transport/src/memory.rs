//! In-process transport.
//!
//! [`pair`] returns a server-side [`MemoryConnection`] and the client-side
//! [`MemoryPeer`] that drives it. Used to exercise connection handlers
//! without sockets.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::traits::{Connection, ConnectionId, MessageSink, MessageStream, TransportError};

/// Create a connected pair.
#[must_use]
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (to_peer, from_server) = mpsc::unbounded_channel();
    let (to_server, from_peer) = mpsc::unbounded_channel();
    (
        MemoryConnection {
            id: ConnectionId::generate(),
            to_peer,
            from_peer,
        },
        MemoryPeer {
            tx: Some(to_server),
            rx: Some(from_server),
        },
    )
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    to_peer: mpsc::UnboundedSender<String>,
    from_peer: mpsc::UnboundedReceiver<String>,
}

impl Connection for MemoryConnection {
    type Sink = MemorySink;
    type Stream = MemoryStream;

    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn split(self) -> (MemorySink, MemoryStream) {
        (
            MemorySink {
                tx: Some(self.to_peer),
            },
            MemoryStream {
                rx: self.from_peer,
            },
        )
    }
}

/// Write half of an in-memory connection.
pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send(&mut self, payload: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(payload)
            .map_err(|_| TransportError::SendFailed("peer stopped reading".into()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, mpsc::UnboundedSender::is_closed)
    }
}

/// Read half of an in-memory connection.
pub struct MemoryStream {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl MessageStream for MemoryStream {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

/// Client side of an in-memory connection.
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: Option<mpsc::UnboundedReceiver<String>>,
}

impl MemoryPeer {
    /// Send a payload to the server. Returns `false` if it cannot arrive.
    pub fn send(&self, payload: impl Into<String>) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.send(payload.into()).is_ok())
    }

    /// Wait for the next payload from the server.
    ///
    /// Returns `None` once the server closes its side.
    pub async fn recv(&mut self) -> Option<String> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Close the client's write side; the server sees end of stream.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }

    /// Stop reading; further server writes fail.
    pub fn stop_reading(&mut self) {
        self.rx = None;
    }
}
