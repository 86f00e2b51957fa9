// Memo Mingle - headless client
// Loads the config, opens the store and logs the signed-in user's decks

use memomingle::app::AppState;
use memomingle::config::{AppConfig, DEFAULT_LOG_FILTER};
use memomingle::models::UserId;
use memomingle::services::ViewStatus;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Filter requested by the config file, unless RUST_LOG takes precedence
fn config_filter(config: &AppConfig, rust_log: Option<&str>) -> Option<EnvFilter> {
    match rust_log {
        Some(_) => None,
        None => Some(EnvFilter::new(config.log_filter())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; the config file may narrow the filter below
    let (filter, filter_handle) = reload::Layer::new(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("memomingle.json"));
    let config = AppConfig::load(&config_path).await?;

    let rust_log = std::env::var("RUST_LOG").ok();
    if let Some(filter) = config_filter(&config, rust_log.as_deref()) {
        filter_handle.reload(filter)?;
    }

    tracing::info!("Starting Memo Mingle with config {:?}", config_path);

    let state = AppState::setup(config).await?;

    match std::env::var("MEMOMINGLE_USER") {
        Ok(user) if !user.trim().is_empty() => state.identity.sign_in(UserId::new(user.trim())),
        _ => tracing::info!("MEMOMINGLE_USER not set, staying signed out"),
    }

    let decks = state.deck_list();
    let mut view = decks.watch();

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                match current.status {
                    ViewStatus::Ready(decks) => {
                        tracing::info!("{} decks", decks.len());
                        for deck in &decks {
                            let star = if deck.favorite { "*" } else { " " };
                            tracing::info!("{} {} ({})", star, deck.label(), deck.slug);
                        }
                    }
                    ViewStatus::Failed(message) => {
                        tracing::error!("Deck list stopped: {}", message)
                    }
                    ViewStatus::Loading => tracing::debug!("Loading decks"),
                    ViewStatus::Idle => tracing::debug!("Deck list idle"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
