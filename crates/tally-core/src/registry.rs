//! Registry of connected clients.
//!
//! Each client is represented by the sending half of a bounded outbox. The
//! client's own connection task drains the receiving half and writes to the
//! socket, so delivery here is a non-blocking enqueue.

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// An encoded event, shared between all recipients.
pub type Payload = Arc<str>;

/// Receiving half of a client's outbox.
pub type Outbox = mpsc::Receiver<Payload>;

/// Identifies a registered client. Ordered by registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Delivery errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The client's connection task has gone away.
    #[error("Client connection closed")]
    Closed,

    /// The client's outbox is full; it is not keeping up.
    #[error("Client outbox full")]
    Lagging,
}

/// A registered client, as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    tx: mpsc::Sender<Payload>,
}

impl ClientHandle {
    /// Get the client ID.
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Enqueue a payload without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Closed`] if the outbox receiver is gone and
    /// [`DeliveryError::Lagging`] if the outbox is full.
    pub fn deliver(&self, payload: Payload) -> Result<(), DeliveryError> {
        self.tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Lagging,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Check whether the client's connection task has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The set of clients currently receiving events.
///
/// The registry holds the only long-lived sender for each outbox, so
/// unregistering a client closes its outbox once in-flight snapshots drop.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<ClientId, ClientHandle>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client with an outbox of the given capacity.
    ///
    /// Returns the client ID and the receiving half of its outbox.
    pub fn register(&self, outbox_capacity: usize) -> (ClientId, Outbox) {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(outbox_capacity.max(1));
        self.clients.insert(id, ClientHandle { id, tx });

        debug!(client = %id, clients = self.clients.len(), "Registered");
        (id, rx)
    }

    /// Remove a client. Returns `true` if it was registered.
    pub fn unregister(&self, id: ClientId) -> bool {
        let removed = self.clients.remove(&id).is_some();
        if removed {
            debug!(client = %id, clients = self.clients.len(), "Unregistered");
        }
        removed
    }

    /// Copy the current clients out, in registration order.
    ///
    /// The copy is taken shard by shard and no lock is held once this
    /// returns.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        let mut clients: Vec<ClientHandle> = self
            .clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        clients.sort_by_key(ClientHandle::id);
        clients
    }

    /// Check if a client is registered.
    #[must_use]
    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Check if no clients are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Remove every client, closing their outboxes.
    pub fn clear(&self) {
        self.clients.clear();
        debug!("Cleared client registry");
    }
}
