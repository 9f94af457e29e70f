//! WebSocket transport implementation.
//!
//! Adapts an upgraded axum [`WebSocket`] to the [`Connection`] traits.
//! Commands and events travel as text frames.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::traits::{Connection, ConnectionId, MessageSink, MessageStream, TransportError};

/// An upgraded WebSocket connection.
pub struct WsConnection {
    id: ConnectionId,
    socket: WebSocket,
}

impl WsConnection {
    /// Wrap an upgraded socket, assigning it a fresh ID.
    #[must_use]
    pub fn new(socket: WebSocket) -> Self {
        Self {
            id: ConnectionId::generate(),
            socket,
        }
    }
}

impl Connection for WsConnection {
    type Sink = WsSink;
    type Stream = WsStream;

    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn split(self) -> (WsSink, WsStream) {
        let (sink, stream) = self.socket.split();
        (
            WsSink {
                id: self.id,
                sink,
                closed: false,
            },
            WsStream {
                id: self.id,
                stream,
            },
        )
    }
}

/// Write half of a WebSocket connection.
pub struct WsSink {
    id: ConnectionId,
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&mut self, payload: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        if let Err(e) = self.sink.send(Message::Text(payload)).await {
            self.closed = true;
            return Err(TransportError::SendFailed(e.to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        debug!(connection = %self.id, "Closing WebSocket");
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Read half of a WebSocket connection.
pub struct WsStream {
    id: ConnectionId,
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl MessageStream for WsStream {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => {
                        warn!(connection = %self.id, "Dropping non UTF-8 binary message");
                    }
                },
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // axum answers pings itself
                }
                Some(Ok(Message::Close(_))) => {
                    debug!(connection = %self.id, "Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}
