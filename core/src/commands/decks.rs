//! Deck commands
//!
//! Every change except creation is limited to the deck's owner.

use super::{alert_failure, authorize, Outcome, Prompt};
use crate::app::AppState;
use crate::error::AppError;
use crate::models::Deck;
use crate::store::DocumentRef;

/// Create a deck for the signed-in user
pub async fn create_deck(
    state: &AppState,
    prompt: &dyn Prompt,
    name: &str,
) -> Outcome<DocumentRef> {
    let owner = state.identity.current();

    match state.mutator.create_deck(name, owner.as_ref()).await {
        Ok(doc) => Outcome::Done(doc),
        Err(AppError::Validation(_)) => Outcome::Skipped,
        Err(AppError::AuthorizationRequired) => {
            alert_failure(prompt, "Please sign in to create decks.")
        }
        Err(e) => {
            tracing::error!("Failed to create deck: {}", e);
            alert_failure(prompt, "Failed to create deck.")
        }
    }
}

/// Rename a deck. An empty or unchanged name is ignored.
pub async fn rename_deck(
    state: &AppState,
    prompt: &dyn Prompt,
    deck: &Deck,
    new_name: &str,
) -> Outcome {
    if let Err(refused) = authorize(state, prompt, Some(&deck.owner_id)) {
        return refused;
    }

    match state.mutator.rename_deck(deck, new_name).await {
        Ok(true) => Outcome::Done(()),
        Ok(false) => Outcome::Skipped,
        Err(e) => {
            tracing::error!("Failed to rename deck {}: {}", deck.id, e);
            alert_failure(prompt, "Failed to rename deck.")
        }
    }
}

/// Flip a deck's favorite flag
pub async fn toggle_deck_favorite(
    state: &AppState,
    prompt: &dyn Prompt,
    deck: &Deck,
) -> Outcome<bool> {
    if let Err(refused) = authorize(state, prompt, Some(&deck.owner_id)) {
        return refused;
    }

    match state.mutator.toggle_deck_favorite(deck).await {
        Ok(favorite) => Outcome::Done(favorite),
        Err(e) => {
            tracing::error!("Failed to update favorite on deck {}: {}", deck.id, e);
            alert_failure(prompt, "Failed to update favorite.")
        }
    }
}

/// Delete a deck and all its cards after confirmation.
/// Returns the number of cards removed.
pub async fn delete_deck(state: &AppState, prompt: &dyn Prompt, deck: &Deck) -> Outcome<usize> {
    if let Err(refused) = authorize(state, prompt, Some(&deck.owner_id)) {
        return refused;
    }

    let question = format!("Delete deck \"{}\" and all its cards?", deck.label());
    if !prompt.confirm(&question) {
        tracing::debug!("Delete of deck {} cancelled", deck.id);
        return Outcome::Cancelled;
    }

    match state.cascade.delete_deck(&deck.id).await {
        Ok(removed) => Outcome::Done(removed),
        Err(e) => {
            tracing::error!("Failed to delete deck {}: {}", deck.id, e);
            alert_failure(prompt, "Failed to delete deck.")
        }
    }
}
