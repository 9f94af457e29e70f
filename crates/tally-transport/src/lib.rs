//! # tally-transport
//!
//! Connection abstraction for the Tally relay.
//!
//! This crate provides a unified interface over the ways a client can be
//! connected:
//!
//! - **WebSocket** - Upgraded axum sockets, text frames
//! - **Memory** - In-process pairs for tests and embedding
//!
//! ## Transport Abstraction
//!
//! Every connection implements [`Connection`] and splits into a
//! [`MessageSink`] and a [`MessageStream`], allowing the server to be
//! transport-agnostic.
//!
//! ```rust,ignore
//! use tally_transport::{Connection, MessageStream};
//!
//! async fn handle_connection(conn: impl Connection) {
//!     let (_sink, mut stream) = conn.split();
//!     while let Ok(Some(payload)) = stream.recv().await {
//!         // Process payload
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{Connection, ConnectionId, MessageSink, MessageStream, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WsConnection;
