//! Integration tests for Memo Mingle
//!
//! These tests verify end-to-end functionality against an on-disk SQLite
//! store:
//! - Deck and card CRUD through the commands
//! - Cascading deck deletes
//! - Live views following the signed-in user and the selected deck
//! - Persistence across a reopen

use memomingle::app::AppState;
use memomingle::commands::{self, Outcome, Prompt};
use memomingle::config::AppConfig;
use memomingle::database::{create_pool, Repository};
use memomingle::models::{CardDraft, Deck, UserId};
use memomingle::services::ViewState;
use memomingle::store::DocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Confirms everything and ignores messages
struct AcceptAll;

impl Prompt for AcceptAll {
    fn confirm(&self, _message: &str) -> bool {
        true
    }

    fn alert(&self, message: &str) {
        panic!("unexpected alert: {}", message);
    }

    fn notice(&self, message: &str) {
        panic!("unexpected notice: {}", message);
    }
}

/// Helper to create app state over a fresh database
async fn create_test_state() -> (AppState, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let state = open_state(&temp_dir).await;
    (state, temp_dir)
}

async fn open_state(temp_dir: &TempDir) -> AppState {
    let pool = create_pool(&temp_dir.path().join("test.db")).await.unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(Repository::new(pool));
    AppState::with_store(AppConfig::default(), store)
}

async fn wait_for_ready<T: Clone>(rx: &mut watch::Receiver<ViewState<T>>, len: usize) -> Vec<T> {
    timeout(WAIT, rx.wait_for(|v| v.is_ready() && v.items().len() == len))
        .await
        .expect("timed out waiting for snapshot")
        .unwrap()
        .items()
        .to_vec()
}

fn draft(title: &str) -> CardDraft {
    CardDraft {
        title: title.to_string(),
        date: None,
        content: format!("<p>{}</p>", title),
    }
}

#[tokio::test]
async fn test_deck_and_card_lifecycle() {
    let (state, _temp) = create_test_state().await;
    state.identity.sign_in(UserId::new("alice"));
    let decks = state.deck_list();
    let mut deck_rx = decks.watch();

    // Create deck
    let outcome = commands::create_deck(&state, &AcceptAll, "Spanish Verbs").await;
    assert!(outcome.is_done());

    let listed = wait_for_ready(&mut deck_rx, 1).await;
    let deck = listed[0].clone();
    assert_eq!(deck.name, "Spanish Verbs");
    assert_eq!(deck.slug, "spanish-verbs");
    assert!(deck.created_at.is_some());

    // Select it and add cards
    let (select, selected) = watch::channel(Some(deck.id.clone()));
    let cards = state.card_list(selected);
    let mut card_rx = cards.watch();
    wait_for_ready(&mut card_rx, 0).await;

    for title in ["hablar", "comer"] {
        let outcome = commands::add_card(&state, &AcceptAll, Some(&deck.id), &draft(title)).await;
        assert!(outcome.is_done());
    }
    let listed = wait_for_ready(&mut card_rx, 2).await;
    assert!(listed.iter().all(|c| c.deck_id == deck.id));
    assert!(listed.iter().all(|c| c.date == state.mutator.today()));

    // Rename and favorite show up in the next snapshot
    commands::rename_deck(&state, &AcceptAll, &deck, "Verbos").await;
    commands::toggle_deck_favorite(&state, &AcceptAll, &deck).await;
    let renamed: Deck = timeout(
        WAIT,
        deck_rx.wait_for(|v| v.items().first().map_or(false, |d| d.name == "Verbos" && d.favorite)),
    )
    .await
    .unwrap()
    .unwrap()
    .items()[0]
    .clone();
    assert_eq!(renamed.slug, "verbos");

    // Cascade delete
    let outcome = commands::delete_deck(&state, &AcceptAll, &renamed).await;
    assert_eq!(outcome, Outcome::Done(2));
    wait_for_ready(&mut deck_rx, 0).await;
    wait_for_ready(&mut card_rx, 0).await;

    select.send_replace(None);
}

#[tokio::test]
async fn test_deck_list_switches_users() {
    let (state, _temp) = create_test_state().await;
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    state.mutator.create_deck("A1", Some(&alice)).await.unwrap();
    state.mutator.create_deck("A2", Some(&alice)).await.unwrap();
    state.mutator.create_deck("B1", Some(&bob)).await.unwrap();

    let decks = state.deck_list();
    let mut rx = decks.watch();

    state.identity.sign_in(alice);
    let mut names: Vec<_> = wait_for_ready(&mut rx, 2).await.into_iter().map(|d| d.name).collect();
    names.sort();
    assert_eq!(names, vec!["A1", "A2"]);

    state.identity.sign_in(bob.clone());
    let listed = timeout(
        WAIT,
        rx.wait_for(|v| v.items().len() == 1 && v.items()[0].name == "B1"),
    )
    .await
    .unwrap()
    .unwrap()
    .items()
    .to_vec();
    assert!(listed.iter().all(|d| d.owner_id == bob));

    // A write for the previous user never reaches the current view
    state
        .mutator
        .create_deck("A3", Some(&UserId::new("alice")))
        .await
        .unwrap();
    state.mutator.create_deck("B2", Some(&bob)).await.unwrap();
    let names: Vec<_> = wait_for_ready(&mut rx, 2).await.into_iter().map(|d| d.name).collect();
    assert!(names.iter().all(|n| n.starts_with('B')));
}

#[tokio::test]
async fn test_card_list_follows_selection() {
    let (state, _temp) = create_test_state().await;
    let owner = UserId::new("alice");
    let first = state.mutator.create_deck("First", Some(&owner)).await.unwrap();
    let second = state.mutator.create_deck("Second", Some(&owner)).await.unwrap();
    state.mutator.create_card(Some(first.id()), &draft("one")).await.unwrap();
    state.mutator.create_card(Some(second.id()), &draft("two")).await.unwrap();
    state.mutator.create_card(Some(second.id()), &draft("three")).await.unwrap();

    let (select, selected) = watch::channel(None);
    let cards = state.card_list(selected);
    let mut rx = cards.watch();

    select.send_replace(Some(first.id().to_string()));
    let listed = wait_for_ready(&mut rx, 1).await;
    assert_eq!(listed[0].title, "one");

    select.send_replace(Some(second.id().to_string()));
    let listed = wait_for_ready(&mut rx, 2).await;
    assert!(listed.iter().all(|c| c.deck_id == second.id()));

    select.send_replace(None);
    timeout(WAIT, rx.wait_for(|v| !v.is_ready()))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let owner = UserId::new("alice");

    let deck_id = {
        let state = open_state(&temp).await;
        let deck = state.mutator.create_deck("Keep", Some(&owner)).await.unwrap();
        state
            .mutator
            .create_card(Some(deck.id()), &draft("persisted"))
            .await
            .unwrap();
        state.mutator.create_memo("remember me").await.unwrap();
        deck.id().to_string()
    };

    let state = open_state(&temp).await;
    state.identity.sign_in(owner);
    let decks = state.deck_list();
    let mut deck_rx = decks.watch();
    let listed = wait_for_ready(&mut deck_rx, 1).await;
    assert_eq!(listed[0].id, deck_id);

    let (_select, selected) = watch::channel(Some(deck_id));
    let cards = state.card_list(selected);
    let mut card_rx = cards.watch();
    assert_eq!(wait_for_ready(&mut card_rx, 1).await[0].title, "persisted");

    let memos = state.memo_list().await.unwrap();
    let mut memo_rx = memos.watch();
    assert_eq!(wait_for_ready(&mut memo_rx, 1).await[0].text, "remember me");
}

#[tokio::test]
async fn test_delete_card_leaves_deck() {
    let (state, _temp) = create_test_state().await;
    let owner = UserId::new("alice");
    state.identity.sign_in(owner.clone());
    let deck = state.mutator.create_deck("Deck", Some(&owner)).await.unwrap();
    state.mutator.create_card(Some(deck.id()), &draft("a")).await.unwrap();
    state.mutator.create_card(Some(deck.id()), &draft("b")).await.unwrap();

    let (_select, selected) = watch::channel(Some(deck.id().to_string()));
    let cards = state.card_list(selected);
    let mut rx = cards.watch();
    let listed = wait_for_ready(&mut rx, 2).await;

    let outcome = commands::delete_card(&state, &AcceptAll, &listed[0]).await;
    assert_eq!(outcome, Outcome::Done(()));

    let remaining = wait_for_ready(&mut rx, 1).await;
    assert_eq!(remaining[0].id, listed[1].id);
    assert_eq!(state.store.get_all(deck.collection()).await.unwrap().len(), 1);
}
