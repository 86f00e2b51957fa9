//! Signed-in user
//!
//! Credentials are handled by the identity provider; the application only
//! ever sees the resulting user id. It is published through a watch
//! channel so live queries can re-subscribe when it changes.

use crate::models::UserId;
use tokio::sync::watch;

#[derive(Clone)]
pub struct Identity {
    current: watch::Sender<Option<UserId>>,
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl Identity {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    pub fn current(&self) -> Option<UserId> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.current.subscribe()
    }

    pub fn sign_in(&self, user: UserId) {
        tracing::info!("Signed in as {}", user);
        self.current.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        tracing::info!("Signed out");
        self.current.send_replace(None);
    }
}
