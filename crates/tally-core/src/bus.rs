//! Event bus between command processing and fanout.
//!
//! Any number of publishers, exactly one consumer, FIFO. Publishing never
//! waits on the consumer or on any client.

use crate::error::RelayError;
use std::sync::Arc;
use tally_protocol::Event;
use tokio::sync::mpsc;
use tracing::trace;

/// Create a new event bus.
#[must_use]
pub fn event_bus() -> (EventPublisher, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventPublisher { tx }, EventStream { rx })
}

/// Publishing half of the bus. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<Arc<Event>>,
}

impl EventPublisher {
    /// Publish an event.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BusClosed`] if the consumer is gone.
    pub fn publish(&self, event: Arc<Event>) -> Result<(), RelayError> {
        trace!(kind = %event.kind(), "Publishing event");
        self.tx.send(event).map_err(|_| RelayError::BusClosed)
    }

    /// Whether the consumer has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming half of the bus.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Arc<Event>>,
}

impl EventStream {
    /// Wait for the next event.
    ///
    /// Returns `None` once every publisher has been dropped and the queue
    /// is drained.
    pub async fn next(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }
}
