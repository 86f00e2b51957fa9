//! Memo commands

use super::{Outcome, Prompt};
use crate::app::AppState;
use crate::error::AppError;
use crate::store::DocumentRef;

/// Add a memo. Blank text is ignored.
pub async fn add_memo(state: &AppState, prompt: &dyn Prompt, text: &str) -> Outcome<DocumentRef> {
    match state.mutator.create_memo(text).await {
        Ok(doc) => Outcome::Done(doc),
        Err(AppError::Validation(_)) => Outcome::Skipped,
        Err(e) => {
            tracing::error!("Failed to add memo: {}", e);
            let message = "Failed to add memo.";
            prompt.notice(message);
            Outcome::Failed(message.to_string())
        }
    }
}
