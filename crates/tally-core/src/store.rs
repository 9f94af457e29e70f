//! Entity storage.
//!
//! The relay reaches cards and lists only through [`EntityStore`]. Each
//! mutating operation is a single atomic step on one entity, so concurrent
//! commands on the same card or list never lose updates.

use crate::model::{Card, CardList, EntityId, EntityKind};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, trace};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No entity with this identifier.
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: EntityId },

    /// The backing store cannot be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    fn card(id: &str) -> Self {
        StoreError::NotFound {
            entity: EntityKind::Card,
            id: id.to_string(),
        }
    }

    fn card_list(id: &str) -> Self {
        StoreError::NotFound {
            entity: EntityKind::CardList,
            id: id.to_string(),
        }
    }
}

/// Persistence for cards and lists.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Create a list with a fresh identifier.
    async fn create_card_list(&self, text: &str) -> Result<CardList, StoreError>;

    /// Find a list by identifier.
    async fn find_card_list(&self, id: &str) -> Result<CardList, StoreError>;

    /// Replace a list's text, returning the updated list.
    async fn rename_card_list(&self, id: &str, text: &str) -> Result<CardList, StoreError>;

    /// Append an existing card to the end of a list.
    async fn append_card(&self, list_id: &str, card_id: &str) -> Result<(), StoreError>;

    /// Create a card with a fresh identifier and a zero counter.
    async fn create_card(&self, text: &str) -> Result<Card, StoreError>;

    /// Find a card by identifier.
    async fn find_card(&self, id: &str) -> Result<Card, StoreError>;

    /// Replace a card's text, returning the updated card.
    async fn rename_card(&self, id: &str, text: &str) -> Result<Card, StoreError>;

    /// Atomically add one to a card's counter, returning the new value.
    async fn increment_counter(&self, id: &str) -> Result<i64, StoreError>;

    /// All lists, in creation order.
    async fn list_card_lists(&self) -> Result<Vec<CardList>, StoreError>;
}

struct ListEntry {
    /// Creation sequence number, used to keep listing order stable.
    seq: u64,
    list: CardList,
}

/// In-process store backed by concurrent maps.
///
/// Per-entity atomicity comes from the map's entry locks: every mutation
/// holds the entry for the duration of a read-modify-write.
#[derive(Default)]
pub struct MemoryStore {
    lists: DashMap<EntityId, ListEntry>,
    cards: DashMap<EntityId, Card>,
    next_seq: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lists.
    #[must_use]
    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    /// Number of cards.
    #[must_use]
    pub fn card_count(&self) -> usize {
        self.cards.len()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_card_list(&self, text: &str) -> Result<CardList, StoreError> {
        let list = CardList::new(text);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.lists.insert(
            list.identifier.clone(),
            ListEntry {
                seq,
                list: list.clone(),
            },
        );
        debug!(list = %list.identifier, "Created card list");
        Ok(list)
    }

    async fn find_card_list(&self, id: &str) -> Result<CardList, StoreError> {
        self.lists
            .get(id)
            .map(|entry| entry.list.clone())
            .ok_or_else(|| StoreError::card_list(id))
    }

    async fn rename_card_list(&self, id: &str, text: &str) -> Result<CardList, StoreError> {
        let mut entry = self
            .lists
            .get_mut(id)
            .ok_or_else(|| StoreError::card_list(id))?;
        entry.list.text = text.to_string();
        Ok(entry.list.clone())
    }

    async fn append_card(&self, list_id: &str, card_id: &str) -> Result<(), StoreError> {
        if !self.cards.contains_key(card_id) {
            return Err(StoreError::card(card_id));
        }

        let mut entry = self
            .lists
            .get_mut(list_id)
            .ok_or_else(|| StoreError::card_list(list_id))?;
        entry.list.cards.push(card_id.to_string());
        trace!(list = %list_id, card = %card_id, "Appended card");
        Ok(())
    }

    async fn create_card(&self, text: &str) -> Result<Card, StoreError> {
        let card = Card::new(text);
        self.cards.insert(card.identifier.clone(), card.clone());
        debug!(card = %card.identifier, "Created card");
        Ok(card)
    }

    async fn find_card(&self, id: &str) -> Result<Card, StoreError> {
        self.cards
            .get(id)
            .map(|card| card.clone())
            .ok_or_else(|| StoreError::card(id))
    }

    async fn rename_card(&self, id: &str, text: &str) -> Result<Card, StoreError> {
        let mut card = self.cards.get_mut(id).ok_or_else(|| StoreError::card(id))?;
        card.text = text.to_string();
        Ok(card.clone())
    }

    async fn increment_counter(&self, id: &str) -> Result<i64, StoreError> {
        let mut card = self.cards.get_mut(id).ok_or_else(|| StoreError::card(id))?;
        card.counter += 1;
        Ok(card.counter)
    }

    async fn list_card_lists(&self) -> Result<Vec<CardList>, StoreError> {
        let mut entries: Vec<(u64, CardList)> = self
            .lists
            .iter()
            .map(|entry| (entry.seq, entry.list.clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries.into_iter().map(|(_, list)| list).collect())
    }
}
