//! Outbound events.
//!
//! Every applied command produces one event, tagged by its `RESP` field,
//! which is broadcast to every connected client.

use crate::command::CommandKind;
use serde::{Deserialize, Serialize};

/// A card as it appears in a refresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSnapshot {
    pub identifier: String,
    pub text: String,
    pub counter: i64,
}

/// A list and its cards as they appear in a refresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardListSnapshot {
    pub identifier: String,
    pub text: String,
    /// Cards in display order.
    pub cards: Vec<CardSnapshot>,
}

/// An event broadcast to all clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "RESP")]
pub enum Event {
    /// Full board snapshot.
    #[serde(rename = "RESP_REFRESH")]
    Refresh {
        #[serde(rename = "DATA")]
        data: Vec<CardListSnapshot>,
    },

    #[serde(rename = "RESP_NEWLIST")]
    NewList {
        #[serde(rename = "IDENTIFIER")]
        identifier: String,
        #[serde(rename = "TEXT")]
        text: String,
    },

    #[serde(rename = "RESP_RENAMELIST")]
    RenameList {
        #[serde(rename = "IDENTIFIER")]
        identifier: String,
        #[serde(rename = "TEXT")]
        text: String,
    },

    #[serde(rename = "RESP_NEWCARD")]
    NewCard {
        #[serde(rename = "IDENTIFIER")]
        identifier: String,
        #[serde(rename = "LISTIDENTIFIER")]
        list_identifier: String,
        #[serde(rename = "TEXT")]
        text: String,
    },

    #[serde(rename = "RESP_RENAMECARD")]
    RenameCard {
        #[serde(rename = "IDENTIFIER")]
        identifier: String,
        #[serde(
            rename = "LISTIDENTIFIER",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        list_identifier: Option<String>,
        #[serde(rename = "TEXT")]
        text: String,
    },

    #[serde(rename = "RESP_UPVOTECARD")]
    UpvoteCard {
        #[serde(rename = "IDENTIFIER")]
        identifier: String,
        #[serde(
            rename = "LISTIDENTIFIER",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        list_identifier: Option<String>,
        #[serde(rename = "COUNTER")]
        counter: i64,
    },
}

impl Event {
    /// The kind of command this event answers.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Event::Refresh { .. } => CommandKind::Refresh,
            Event::NewList { .. } => CommandKind::NewList,
            Event::RenameList { .. } => CommandKind::RenameList,
            Event::NewCard { .. } => CommandKind::NewCard,
            Event::RenameCard { .. } => CommandKind::RenameCard,
            Event::UpvoteCard { .. } => CommandKind::UpvoteCard,
        }
    }

    /// The value carried in the `RESP` field.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("RESP_{}", self.kind().tag())
    }
}
