//! # tally-protocol
//!
//! Wire protocol definitions for the Tally board relay.
//!
//! Clients send commands as JSON text tagged by `REQ` and receive events
//! tagged by `RESP`. This crate defines both schemas and the codec.
//!
//! ## Commands
//!
//! - `REFRESH` - Request the full board snapshot
//! - `NEWLIST` / `RENAMELIST` - Create and rename lists
//! - `NEWCARD` / `RENAMECARD` / `UPVOTECARD` - Create, rename and vote on cards
//!
//! ## Example
//!
//! ```rust
//! use tally_protocol::{codec, Command, Event};
//!
//! let command = codec::decode_command(r#"{"REQ":"NEWCARD","LISTIDENTIFIER":"l1"}"#).unwrap();
//! assert_eq!(command, Command::new_card("l1"));
//!
//! let event = Event::NewList { identifier: "l1".into(), text: "Untitled".into() };
//! let encoded = codec::encode_event(&event).unwrap();
//! assert!(encoded.starts_with(r#"{"RESP":"RESP_NEWLIST""#));
//! ```

pub mod codec;
pub mod command;
pub mod event;

pub use codec::{
    decode_command, decode_command_with_limit, encode_command, encode_event, ProtocolError,
    MAX_PAYLOAD_SIZE,
};
pub use command::{Command, CommandKind};
pub use event::{CardListSnapshot, CardSnapshot, Event};
