//! Deletes
//!
//! A deck owns its cards structurally, but the store does not remove
//! nested documents on its own. Deleting a deck therefore reads its
//! cards, removes them in one atomic batch, and only then deletes the
//! deck document. If the batch fails the deck stays, so the user can
//! simply try again.
//!
//! There is no transaction spanning the batch and the deck delete: a
//! crash in between leaves an empty deck behind, which is harmless.

use super::mutator::{card_ref, cards_collection, deck_ref};
use crate::error::Result;
use crate::store::{DocumentRef, DocumentStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct CascadeDeleter {
    store: Arc<dyn DocumentStore>,
}

impl CascadeDeleter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Delete a deck and every card under it. Returns the number of
    /// cards removed.
    pub async fn delete_deck(&self, deck_id: &str) -> Result<usize> {
        let deck = deck_ref(deck_id)?;
        let cards = cards_collection(deck_id)?;

        tracing::info!("Deleting deck {} with its cards", deck_id);

        let refs: Vec<DocumentRef> = self
            .store
            .get_all(&cards)
            .await?
            .into_iter()
            .map(|doc| doc.reference)
            .collect();

        if !refs.is_empty() {
            self.store.delete_batch(&refs).await.map_err(|e| {
                tracing::error!("Card batch for deck {} failed, deck kept: {}", deck_id, e);
                e
            })?;
            tracing::debug!("Deleted {} cards of deck {}", refs.len(), deck_id);
        }

        self.store.delete(&deck).await.map_err(|e| {
            tracing::error!("Cards of deck {} removed but the deck was kept: {}", deck_id, e);
            e
        })?;

        tracing::info!("Deck deleted: {} ({} cards)", deck_id, refs.len());
        Ok(refs.len())
    }

    /// Delete one card. Closing any view showing it is up to the caller.
    pub async fn delete_card(&self, deck_id: &str, card_id: &str) -> Result<()> {
        tracing::info!("Deleting card {} from deck {}", card_id, deck_id);
        self.store.delete(&card_ref(deck_id, card_id)?).await
    }
}
