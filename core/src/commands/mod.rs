//! User-intent commands
//!
//! Each command takes the [`AppState`](crate::app::AppState) and a
//! [`Prompt`], runs one mutation or delete, and reports what happened as
//! an [`Outcome`]. Failures never propagate as errors: they are logged
//! and shown through the prompt, the way the view layer expects them.
//!
//! - `decks`: create, rename, favorite and delete decks
//! - `cards`: create, edit, favorite and delete cards
//! - `memos`: add memos

pub mod cards;
pub mod decks;
pub mod memos;

pub use cards::*;
pub use decks::*;
pub use memos::*;

use crate::app::AppState;
use crate::models::UserId;

/// The view layer's dialog seam
pub trait Prompt: Send + Sync {
    /// Ask the user to confirm a destructive action
    fn confirm(&self, message: &str) -> bool;

    /// Show a blocking error
    fn alert(&self, message: &str);

    /// Show a non-blocking message next to the form that caused it
    fn notice(&self, message: &str);
}

/// Result of a user intent
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T = ()> {
    /// The write was accepted by the store
    Done(T),
    /// Nothing to do, no request issued
    Skipped,
    /// The user declined the confirmation
    Cancelled,
    /// The request failed; the message has been shown
    Failed(String),
}

impl<T> Outcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }
}

/// Shown when a change is attempted while signed out
pub const SIGN_IN_REQUIRED: &str = "Please sign in to continue.";
/// Shown when a deck is changed by someone other than its owner
pub const OWNER_REQUIRED: &str = "You can only change your own decks.";

/// Show a blocking alert and report the failure
fn alert_failure<T>(prompt: &dyn Prompt, message: &str) -> Outcome<T> {
    prompt.alert(message);
    Outcome::Failed(message.to_string())
}

/// Check that someone is signed in and, when `owner` is given, that it
/// is them. On refusal the alert has been shown and the returned outcome
/// should be handed back to the caller.
fn authorize<T>(
    state: &AppState,
    prompt: &dyn Prompt,
    owner: Option<&UserId>,
) -> std::result::Result<UserId, Outcome<T>> {
    let Some(user) = state.identity.current() else {
        tracing::warn!("Change refused: nobody is signed in");
        return Err(alert_failure(prompt, SIGN_IN_REQUIRED));
    };
    if let Some(owner) = owner {
        if *owner != user {
            tracing::warn!("Change refused: deck of {} touched by {}", owner, user);
            return Err(alert_failure(prompt, OWNER_REQUIRED));
        }
    }
    Ok(user)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Prompt;
    use crate::app::AppState;
    use crate::config::AppConfig;
    use crate::models::UserId;
    use crate::store::MemoryStore;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every dialog and answers confirmations with a fixed reply
    pub struct RecordingPrompt {
        answer: bool,
        pub confirms: Mutex<Vec<String>>,
        pub alerts: Mutex<Vec<String>>,
        pub notices: Mutex<Vec<String>>,
    }

    impl RecordingPrompt {
        pub fn answering(answer: bool) -> Self {
            Self {
                answer,
                confirms: Mutex::new(Vec::new()),
                alerts: Mutex::new(Vec::new()),
                notices: Mutex::new(Vec::new()),
            }
        }

        pub fn alerts(&self) -> Vec<String> {
            self.alerts.lock().clone()
        }

        pub fn notices(&self) -> Vec<String> {
            self.notices.lock().clone()
        }

        pub fn confirms(&self) -> Vec<String> {
            self.confirms.lock().clone()
        }
    }

    impl Prompt for RecordingPrompt {
        fn confirm(&self, message: &str) -> bool {
            self.confirms.lock().push(message.to_string());
            self.answer
        }

        fn alert(&self, message: &str) {
            self.alerts.lock().push(message.to_string());
        }

        fn notice(&self, message: &str) {
            self.notices.lock().push(message.to_string());
        }
    }

    /// App state over an in-memory store with `alice` signed in
    pub fn signed_in_state() -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::with_store(AppConfig::default(), store.clone());
        state.identity.sign_in(UserId::new("alice"));
        (state, store)
    }
}
