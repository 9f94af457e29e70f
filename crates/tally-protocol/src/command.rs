//! Inbound commands.
//!
//! A command is a JSON object tagged by its `REQ` field. Field names are
//! upper-case on the wire (`IDENTIFIER`, `TEXT`, `LISTIDENTIFIER`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of command kinds a client may submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Refresh,
    NewList,
    RenameList,
    NewCard,
    RenameCard,
    UpvoteCard,
}

impl CommandKind {
    /// All kinds, in wire-tag order.
    pub const ALL: [CommandKind; 6] = [
        CommandKind::Refresh,
        CommandKind::NewList,
        CommandKind::RenameList,
        CommandKind::NewCard,
        CommandKind::RenameCard,
        CommandKind::UpvoteCard,
    ];

    /// The value carried in the `REQ` field.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            CommandKind::Refresh => "REFRESH",
            CommandKind::NewList => "NEWLIST",
            CommandKind::RenameList => "RENAMELIST",
            CommandKind::NewCard => "NEWCARD",
            CommandKind::RenameCard => "RENAMECARD",
            CommandKind::UpvoteCard => "UPVOTECARD",
        }
    }

    /// Look up a kind by its `REQ` tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A command submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "REQ")]
pub enum Command {
    /// Request a full snapshot of every list and card.
    #[serde(rename = "REFRESH")]
    Refresh,

    /// Create a new, untitled list.
    #[serde(rename = "NEWLIST")]
    NewList,

    /// Rename an existing list.
    #[serde(rename = "RENAMELIST")]
    RenameList {
        #[serde(rename = "IDENTIFIER")]
        identifier: String,
        #[serde(rename = "TEXT")]
        text: String,
    },

    /// Create a new, untitled card at the end of a list.
    #[serde(rename = "NEWCARD")]
    NewCard {
        #[serde(rename = "LISTIDENTIFIER")]
        list_identifier: String,
    },

    /// Rename an existing card.
    #[serde(rename = "RENAMECARD")]
    RenameCard {
        #[serde(rename = "IDENTIFIER")]
        identifier: String,
        /// Echoed back in the response; the card itself is found by id.
        #[serde(
            rename = "LISTIDENTIFIER",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        list_identifier: Option<String>,
        #[serde(rename = "TEXT")]
        text: String,
    },

    /// Add one vote to a card.
    #[serde(rename = "UPVOTECARD")]
    UpvoteCard {
        #[serde(rename = "IDENTIFIER")]
        identifier: String,
        #[serde(
            rename = "LISTIDENTIFIER",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        list_identifier: Option<String>,
    },
}

impl Command {
    /// Create a rename-list command.
    #[must_use]
    pub fn rename_list(identifier: impl Into<String>, text: impl Into<String>) -> Self {
        Command::RenameList {
            identifier: identifier.into(),
            text: text.into(),
        }
    }

    /// Create a new-card command targeting a list.
    #[must_use]
    pub fn new_card(list_identifier: impl Into<String>) -> Self {
        Command::NewCard {
            list_identifier: list_identifier.into(),
        }
    }

    /// Create a rename-card command.
    #[must_use]
    pub fn rename_card(
        identifier: impl Into<String>,
        list_identifier: Option<String>,
        text: impl Into<String>,
    ) -> Self {
        Command::RenameCard {
            identifier: identifier.into(),
            list_identifier,
            text: text.into(),
        }
    }

    /// Create an upvote command.
    #[must_use]
    pub fn upvote_card(identifier: impl Into<String>, list_identifier: Option<String>) -> Self {
        Command::UpvoteCard {
            identifier: identifier.into(),
            list_identifier,
        }
    }

    /// Get the command kind.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Refresh => CommandKind::Refresh,
            Command::NewList => CommandKind::NewList,
            Command::RenameList { .. } => CommandKind::RenameList,
            Command::NewCard { .. } => CommandKind::NewCard,
            Command::RenameCard { .. } => CommandKind::RenameCard,
            Command::UpvoteCard { .. } => CommandKind::UpvoteCard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_match_serde_tags() {
        let commands = [
            Command::Refresh,
            Command::NewList,
            Command::rename_list("l1", "Todo"),
            Command::new_card("l1"),
            Command::rename_card("c1", None, "Write docs"),
            Command::upvote_card("c1", Some("l1".to_string())),
        ];

        for command in commands {
            let value = serde_json::to_value(&command).unwrap();
            assert_eq!(value["REQ"], command.kind().tag());
        }
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(CommandKind::from_tag("NEWCARD"), Some(CommandKind::NewCard));
        assert_eq!(CommandKind::from_tag("newcard"), None);
        assert_eq!(CommandKind::from_tag("DELETECARD"), None);
    }

    #[test]
    fn test_list_identifier_is_optional_on_upvote() {
        let command: Command =
            serde_json::from_str(r#"{"REQ":"UPVOTECARD","IDENTIFIER":"c1"}"#).unwrap();
        assert_eq!(command, Command::upvote_card("c1", None));
    }
}
