//! Command processing.
//!
//! Applies one [`Command`] to the [`EntityStore`] and describes the result
//! as an [`Event`]. Knows nothing about clients or delivery.

use crate::error::RelayError;
use crate::model::DEFAULT_TEXT;
use crate::store::EntityStore;
use tally_protocol::{CardListSnapshot, CardSnapshot, Command, Event};
use tracing::trace;

/// Apply a command to the store.
///
/// # Errors
///
/// Returns [`RelayError::NotFound`] if the command references a missing
/// list or card, and [`RelayError::StoreUnavailable`] if the store fails.
/// Nothing is written when the target entity is missing.
pub async fn process(command: Command, store: &dyn EntityStore) -> Result<Event, RelayError> {
    trace!(kind = %command.kind(), "Processing command");

    let event = match command {
        Command::Refresh => Event::Refresh {
            data: snapshot(store).await?,
        },

        Command::NewList => {
            let list = store.create_card_list(DEFAULT_TEXT).await?;
            Event::NewList {
                identifier: list.identifier,
                text: list.text,
            }
        }

        Command::RenameList { identifier, text } => {
            let list = store.rename_card_list(&identifier, &text).await?;
            Event::RenameList {
                identifier: list.identifier,
                text: list.text,
            }
        }

        Command::NewCard { list_identifier } => {
            // Check the list first so a bad target never leaves an orphan card.
            let list = store.find_card_list(&list_identifier).await?;
            let card = store.create_card(DEFAULT_TEXT).await?;
            store.append_card(&list.identifier, &card.identifier).await?;
            Event::NewCard {
                identifier: card.identifier,
                list_identifier: list.identifier,
                text: card.text,
            }
        }

        Command::RenameCard {
            identifier,
            list_identifier,
            text,
        } => {
            let card = store.rename_card(&identifier, &text).await?;
            Event::RenameCard {
                identifier: card.identifier,
                list_identifier,
                text: card.text,
            }
        }

        Command::UpvoteCard {
            identifier,
            list_identifier,
        } => {
            let counter = store.increment_counter(&identifier).await?;
            Event::UpvoteCard {
                identifier,
                list_identifier,
                counter,
            }
        }
    };

    Ok(event)
}

/// Read every list with its cards, in display order.
async fn snapshot(store: &dyn EntityStore) -> Result<Vec<CardListSnapshot>, RelayError> {
    let lists = store.list_card_lists().await?;
    let mut data = Vec::with_capacity(lists.len());

    for list in lists {
        let mut cards = Vec::with_capacity(list.cards.len());
        for card_id in &list.cards {
            let card = store.find_card(card_id).await?;
            cards.push(CardSnapshot {
                identifier: card.identifier,
                text: card.text,
                counter: card.counter,
            });
        }
        data.push(CardListSnapshot {
            identifier: list.identifier,
            text: list.text,
            cards,
        });
    }

    Ok(data)
}
