//! Card commands
//!
//! Card forms report problems inline rather than with a blocking alert,
//! except for deletes which are confirmed up front. Every card change
//! requires a signed-in user.

use super::{alert_failure, authorize, Outcome, Prompt};
use crate::app::AppState;
use crate::error::AppError;
use crate::models::{Card, CardDraft};
use crate::store::DocumentRef;

const SAVE_FAILED: &str = "Failed to save card";

fn inline_failure<T>(prompt: &dyn Prompt, error: AppError) -> Outcome<T> {
    let message = match error {
        AppError::Validation(message) => message,
        other => {
            tracing::error!("Failed to save card: {}", other);
            SAVE_FAILED.to_string()
        }
    };
    prompt.notice(&message);
    Outcome::Failed(message)
}

/// Add a card to the selected deck
pub async fn add_card(
    state: &AppState,
    prompt: &dyn Prompt,
    deck_id: Option<&str>,
    draft: &CardDraft,
) -> Outcome<DocumentRef> {
    if let Err(refused) = authorize(state, prompt, None) {
        return refused;
    }

    match state.mutator.create_card(deck_id, draft).await {
        Ok(doc) => Outcome::Done(doc),
        Err(e) => inline_failure(prompt, e),
    }
}

/// Save edits to an existing card
pub async fn save_card(
    state: &AppState,
    prompt: &dyn Prompt,
    deck_id: Option<&str>,
    card_id: &str,
    draft: &CardDraft,
) -> Outcome {
    if let Err(refused) = authorize(state, prompt, None) {
        return refused;
    }

    match state.mutator.edit_card(deck_id, card_id, draft).await {
        Ok(()) => Outcome::Done(()),
        Err(e) => inline_failure(prompt, e),
    }
}

/// Flip a card's favorite flag
pub async fn toggle_card_favorite(
    state: &AppState,
    prompt: &dyn Prompt,
    card: &Card,
) -> Outcome<bool> {
    if let Err(refused) = authorize(state, prompt, None) {
        return refused;
    }

    match state.mutator.toggle_card_favorite(card).await {
        Ok(favorite) => Outcome::Done(favorite),
        Err(e) => {
            tracing::error!("Failed to update favorite on card {}: {}", card.id, e);
            alert_failure(prompt, "Failed to update favorite.")
        }
    }
}

/// Delete a card after confirmation
pub async fn delete_card(state: &AppState, prompt: &dyn Prompt, card: &Card) -> Outcome {
    if let Err(refused) = authorize(state, prompt, None) {
        return refused;
    }

    if !prompt.confirm("Delete this card? This cannot be undone.") {
        return Outcome::Cancelled;
    }

    match state.cascade.delete_card(&card.deck_id, &card.id).await {
        Ok(()) => Outcome::Done(()),
        Err(e) => {
            tracing::error!("Failed to delete card {}: {}", card.id, e);
            alert_failure(prompt, "Failed to delete card.")
        }
    }
}
