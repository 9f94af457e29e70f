//! # tally-core
//!
//! Command processing, event bus and fanout engine for the Tally relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Store** - Entity storage trait and an in-memory implementation
//! - **Processor** - Applies commands to the store and produces events
//! - **Bus** - FIFO channel between command intake and fanout
//! - **Registry** - The set of clients currently receiving events
//! - **Dispatcher** - Delivers each event to every registered client
//! - **Relay** - Owns all of the above with an explicit lifecycle
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Inbound   │────▶│  Processor  │────▶│  Event Bus  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//!                     │    Store    │     │ Dispatcher  │────▶│  Registry   │
//!                     └─────────────┘     └─────────────┘     └─────────────┘
//!                                                                    │
//!                                                                    ▼
//!                                                             per-client outboxes
//! ```

pub mod bus;
pub mod dispatcher;
pub mod error;
pub mod model;
pub mod processor;
pub mod registry;
pub mod relay;
pub mod store;

pub use bus::{event_bus, EventPublisher, EventStream};
pub use dispatcher::{FanoutDispatcher, FanoutReport, FanoutStats};
pub use error::RelayError;
pub use model::{Card, CardList, EntityId, EntityKind, DEFAULT_TEXT};
pub use processor::process;
pub use registry::{ClientHandle, ClientId, ClientRegistry, DeliveryError, Outbox, Payload};
pub use relay::{Relay, RelayConfig, RelayStats};
pub use store::{EntityStore, MemoryStore, StoreError};
