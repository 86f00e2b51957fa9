//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::config::{AppConfig, StoreBackend};
use crate::database::{create_pool, Repository};
use crate::error::Result;
use crate::identity::Identity;
use crate::models::{Card, Deck, Memo};
use crate::services::live_query::{cards_in_deck, decks_owned_by, recent_memos};
use crate::services::{CascadeDeleter, EntityMutator, FollowHandle, LiveView};
use crate::store::{DocumentStore, MemoryStore};
use std::sync::Arc;
use tokio::sync::watch;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn DocumentStore>,
    pub identity: Identity,
    pub mutator: EntityMutator,
    pub cascade: CascadeDeleter,
}

impl AppState {
    /// Build the services on top of an already opened store
    pub fn with_store(config: AppConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config,
            identity: Identity::new(),
            mutator: EntityMutator::new(store.clone()),
            cascade: CascadeDeleter::new(store.clone()),
            store,
        }
    }

    /// Application setup - called once on startup
    pub async fn setup(config: AppConfig) -> Result<Self> {
        tracing::info!("Initializing application");
        tracing::info!("Data directory: {:?}", config.data_dir);

        tokio::fs::create_dir_all(&config.data_dir).await?;

        let store: Arc<dyn DocumentStore> = match config.backend {
            StoreBackend::Sqlite => {
                let pool = create_pool(&config.database_path()).await?;
                Arc::new(Repository::new(pool))
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store, nothing will be persisted");
                Arc::new(MemoryStore::new())
            }
        };

        tracing::info!("Application initialized successfully");

        Ok(Self::with_store(config, store))
    }

    /// Decks of the signed-in user, re-subscribed on every sign-in and
    /// sign-out. Idle while nobody is signed in.
    pub fn deck_list(&self) -> FollowHandle<Deck> {
        LiveView::new(self.store.clone(), decks_owned_by).follow(self.identity.subscribe())
    }

    /// Cards of whichever deck `selected` points at
    pub fn card_list(&self, selected: watch::Receiver<Option<String>>) -> FollowHandle<Card> {
        LiveView::new(self.store.clone(), |deck_id: &String| cards_in_deck(deck_id))
            .follow(selected)
    }

    /// All memos, newest first
    pub async fn memo_list(&self) -> Result<LiveView<(), Memo>> {
        let mut view = LiveView::new(self.store.clone(), |_: &()| recent_memos());
        view.set_param(Some(())).await?;
        Ok(view)
    }
}
