//! Relay errors.
//!
//! None of these is fatal to the relay: each one drops a single command or
//! a single client's registration.

use crate::model::{EntityId, EntityKind};
use crate::registry::DeliveryError;
use crate::store::StoreError;
use tally_protocol::ProtocolError;
use thiserror::Error;

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed inbound payload.
    #[error("Malformed payload: {0}")]
    Decode(ProtocolError),

    /// The payload names a command kind with no handler.
    #[error("Unknown command kind: {0}")]
    UnknownCommandKind(String),

    /// The command references an entity that does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: EntityId },

    /// Delivering an event to one client failed.
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// The entity store could not be reached.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The event bus has no consumer left.
    #[error("Event bus closed")]
    BusClosed,
}

impl RelayError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Decode(_) => "decode",
            RelayError::UnknownCommandKind(_) => "unknown_command",
            RelayError::NotFound { .. } => "not_found",
            RelayError::Delivery(_) => "delivery",
            RelayError::StoreUnavailable(_) => "store_unavailable",
            RelayError::BusClosed => "bus_closed",
        }
    }
}

impl From<ProtocolError> for RelayError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownKind(kind) => RelayError::UnknownCommandKind(kind),
            other => RelayError::Decode(other),
        }
    }
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => RelayError::NotFound { entity, id },
            StoreError::Unavailable(reason) => RelayError::StoreUnavailable(reason),
        }
    }
}
