//! Board entities.

use uuid::Uuid;

/// Text given to newly created lists and cards.
pub const DEFAULT_TEXT: &str = "Untitled";

/// An entity identifier (a UUIDv4 string, opaque to clients).
pub type EntityId = String;

/// Generate a fresh identifier.
#[must_use]
pub fn new_identifier() -> EntityId {
    Uuid::new_v4().to_string()
}

/// The kind of entity an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Card,
    CardList,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Card => f.write_str("card"),
            EntityKind::CardList => f.write_str("card list"),
        }
    }
}

/// A votable card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub identifier: EntityId,
    pub text: String,
    /// Vote count, starts at 0.
    pub counter: i64,
}

impl Card {
    /// Create a card with a fresh identifier and a zero counter.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            identifier: new_identifier(),
            text: text.into(),
            counter: 0,
        }
    }
}

/// A named, ordered list of cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardList {
    pub identifier: EntityId,
    pub text: String,
    /// Card identifiers in display order.
    pub cards: Vec<EntityId>,
}

impl CardList {
    /// Create an empty list with a fresh identifier.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            identifier: new_identifier(),
            text: text.into(),
            cards: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_card() {
        let card = Card::new(DEFAULT_TEXT);
        assert_eq!(card.text, "Untitled");
        assert_eq!(card.counter, 0);
        assert!(Uuid::parse_str(&card.identifier).is_ok());
    }

    #[test]
    fn test_identifiers_are_unique() {
        let a = CardList::new("a");
        let b = CardList::new("b");
        assert_ne!(a.identifier, b.identifier);
        assert!(a.cards.is_empty());
    }
}
