//! Entity mutations
//!
//! Validates and normalizes user input, then issues exactly one document
//! write. Nothing here touches a cached list: callers see the result in
//! the next live query snapshot.

use crate::config::{
    CARDS_COLLECTION, CARD_DATE_FORMAT, DECKS_COLLECTION, FIELD_CONTENT, FIELD_CREATED_AT,
    FIELD_DATE, FIELD_FAVORITE, FIELD_NAME, FIELD_OWNER, FIELD_SLUG, FIELD_TEXT, FIELD_TITLE,
    FIELD_UPDATED_AT, MEMOS_COLLECTION,
};
use crate::error::{AppError, Result};
use crate::models::{Card, CardDraft, Deck, UserId};
use crate::slug::slugify;
use crate::store::{CollectionPath, DocumentRef, DocumentStore, Fields};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

/// Reference to a deck document
pub fn deck_ref(deck_id: &str) -> Result<DocumentRef> {
    CollectionPath::root(DECKS_COLLECTION)?.doc(deck_id)
}

/// Collection holding a deck's cards
pub fn cards_collection(deck_id: &str) -> Result<CollectionPath> {
    deck_ref(deck_id)?.sub_collection(CARDS_COLLECTION)
}

/// Reference to a card document
pub fn card_ref(deck_id: &str, card_id: &str) -> Result<DocumentRef> {
    cards_collection(deck_id)?.doc(card_id)
}

fn require_deck_id(deck_id: Option<&str>) -> Result<&str> {
    match deck_id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(AppError::Validation("Missing deckId".to_string())),
    }
}

fn require_title(title: &str) -> Result<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    Ok(title)
}

/// Issues validated single-document writes
#[derive(Clone)]
pub struct EntityMutator {
    store: Arc<dyn DocumentStore>,
    clock: fn() -> DateTime<Utc>,
}

impl EntityMutator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_clock(store, Utc::now)
    }

    /// Use a fixed clock for the default card date
    pub fn with_clock(store: Arc<dyn DocumentStore>, clock: fn() -> DateTime<Utc>) -> Self {
        Self { store, clock }
    }

    /// Today's UTC calendar date as `YYYY-MM-DD`
    pub fn today(&self) -> String {
        (self.clock)().date_naive().format(CARD_DATE_FORMAT).to_string()
    }

    /// Create a deck owned by `owner`
    pub async fn create_deck(&self, name: &str, owner: Option<&UserId>) -> Result<DocumentRef> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Deck name is required".to_string()));
        }
        let owner = owner.ok_or(AppError::AuthorizationRequired)?;

        tracing::info!("Creating deck {:?} for {}", name, owner);

        let fields = Fields::new()
            .set(FIELD_NAME, name)
            .set(FIELD_SLUG, slugify(name))
            .set(FIELD_OWNER, owner.as_str())
            .set(FIELD_FAVORITE, false)
            .server_timestamp(FIELD_CREATED_AT);
        let collection = CollectionPath::root(DECKS_COLLECTION)?;
        let doc = self.store.add(&collection, fields).await?;

        tracing::info!("Deck created: {}", doc.id());
        Ok(doc)
    }

    /// Rename a deck and re-derive its slug. Returns false without writing
    /// when the new name is empty or unchanged.
    pub async fn rename_deck(&self, deck: &Deck, new_name: &str) -> Result<bool> {
        let name = new_name.trim();
        if name.is_empty() || name == deck.name {
            tracing::debug!("Rename of deck {} skipped", deck.id);
            return Ok(false);
        }

        tracing::info!("Renaming deck {} to {:?}", deck.id, name);

        let fields = Fields::new()
            .set(FIELD_NAME, name)
            .set(FIELD_SLUG, slugify(name));
        self.store.update(&deck_ref(&deck.id)?, fields).await?;
        Ok(true)
    }

    /// Flip a deck's favorite flag; returns the value written
    pub async fn toggle_deck_favorite(&self, deck: &Deck) -> Result<bool> {
        let favorite = !deck.favorite;
        tracing::debug!("Setting deck {} favorite = {}", deck.id, favorite);

        self.store
            .update(&deck_ref(&deck.id)?, Fields::new().set(FIELD_FAVORITE, favorite))
            .await?;
        Ok(favorite)
    }

    /// Add a card to a deck
    pub async fn create_card(
        &self,
        deck_id: Option<&str>,
        draft: &CardDraft,
    ) -> Result<DocumentRef> {
        let deck_id = require_deck_id(deck_id)?;
        let title = require_title(&draft.title)?;
        let date = self.card_date(draft.date.as_deref())?;

        tracing::info!("Creating card {:?} in deck {}", title, deck_id);

        let fields = Fields::new()
            .set(FIELD_TITLE, title)
            .set(FIELD_DATE, date)
            .set(FIELD_CONTENT, draft.content.as_str())
            .set(FIELD_FAVORITE, false)
            .server_timestamp(FIELD_CREATED_AT);
        let doc = self.store.add(&cards_collection(deck_id)?, fields).await?;

        tracing::info!("Card created: {}", doc);
        Ok(doc)
    }

    /// Replace a card's title, date and content
    pub async fn edit_card(
        &self,
        deck_id: Option<&str>,
        card_id: &str,
        draft: &CardDraft,
    ) -> Result<()> {
        let deck_id = require_deck_id(deck_id)?;
        let title = require_title(&draft.title)?;
        let date = self.card_date(draft.date.as_deref())?;

        tracing::debug!("Updating card {} in deck {}", card_id, deck_id);

        let fields = Fields::new()
            .set(FIELD_TITLE, title)
            .set(FIELD_DATE, date)
            .set(FIELD_CONTENT, draft.content.as_str())
            .server_timestamp(FIELD_UPDATED_AT);
        self.store.update(&card_ref(deck_id, card_id)?, fields).await
    }

    /// Flip a card's favorite flag; returns the value written
    pub async fn toggle_card_favorite(&self, card: &Card) -> Result<bool> {
        let favorite = !card.favorite;
        tracing::debug!("Setting card {} favorite = {}", card.id, favorite);

        let fields = Fields::new()
            .set(FIELD_FAVORITE, favorite)
            .server_timestamp(FIELD_UPDATED_AT);
        self.store
            .update(&card_ref(&card.deck_id, &card.id)?, fields)
            .await?;
        Ok(favorite)
    }

    /// Add a memo
    pub async fn create_memo(&self, text: &str) -> Result<DocumentRef> {
        if text.trim().is_empty() {
            return Err(AppError::Validation("Memo text is required".to_string()));
        }

        let fields = Fields::new()
            .set(FIELD_TEXT, text)
            .server_timestamp(FIELD_CREATED_AT);
        let doc = self
            .store
            .add(&CollectionPath::root(MEMOS_COLLECTION)?, fields)
            .await?;

        tracing::debug!("Memo created: {}", doc.id());
        Ok(doc)
    }

    fn card_date(&self, date: Option<&str>) -> Result<String> {
        match date.map(str::trim) {
            None | Some("") => Ok(self.today()),
            Some(date) => NaiveDate::parse_from_str(date, CARD_DATE_FORMAT)
                .map(|d| d.format(CARD_DATE_FORMAT).to_string())
                .map_err(|_| AppError::Validation(format!("Invalid date: {}", date))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FromDocument;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 23, 59, 30).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, EntityMutator) {
        let store = Arc::new(MemoryStore::with_clock(fixed_now));
        let mutator = EntityMutator::with_clock(store.clone(), fixed_now);
        (store, mutator)
    }

    fn alice() -> UserId {
        UserId::new("alice")
    }

    fn load_deck(store: &MemoryStore, doc: &DocumentRef) -> Deck {
        Deck::from_document(&store.get(doc).unwrap()).unwrap()
    }

    fn load_card(store: &MemoryStore, doc: &DocumentRef) -> Card {
        Card::from_document(&store.get(doc).unwrap()).unwrap()
    }

    fn draft(title: &str, date: Option<&str>) -> CardDraft {
        CardDraft {
            title: title.to_string(),
            date: date.map(str::to_string),
            content: "<p>body</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_deck_normalizes_input() {
        let (store, mutator) = setup();

        let doc = mutator
            .create_deck("  My Great Deck!! ", Some(&alice()))
            .await
            .unwrap();

        let stored = store.get(&doc).unwrap();
        assert_eq!(stored.get("name"), Some(&json!("My Great Deck!!")));
        assert_eq!(stored.get("slug"), Some(&json!("my-great-deck")));
        assert_eq!(stored.get("userId"), Some(&json!("alice")));
        assert_eq!(stored.get("favorite"), Some(&json!(false)));
        assert_eq!(stored.get("createdAt"), Some(&json!("2026-03-04T23:59:30.000Z")));
    }

    #[tokio::test]
    async fn test_create_deck_rejects_empty_name() {
        let (store, mutator) = setup();

        for name in ["", "   "] {
            let result = mutator.create_deck(name, Some(&alice())).await;
            assert!(result.unwrap_err().is_validation());
        }
        assert_eq!(store.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_deck_requires_user() {
        let (store, mutator) = setup();

        let result = mutator.create_deck("Rust", None).await;

        assert!(matches!(result, Err(AppError::AuthorizationRequired)));
        assert_eq!(store.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_rename_deck_rederives_slug() {
        let (store, mutator) = setup();
        let doc = mutator.create_deck("Old", Some(&alice())).await.unwrap();
        let deck = load_deck(&store, &doc);

        assert!(mutator.rename_deck(&deck, " New Name ").await.unwrap());

        let renamed = load_deck(&store, &doc);
        assert_eq!(renamed.name, "New Name");
        assert_eq!(renamed.slug, "new-name");
        assert_eq!(renamed.owner_id, alice());
    }

    #[tokio::test]
    async fn test_rename_deck_noop() {
        let (store, mutator) = setup();
        let doc = mutator.create_deck("Same", Some(&alice())).await.unwrap();
        let deck = load_deck(&store, &doc);
        let writes = store.write_calls();

        assert!(!mutator.rename_deck(&deck, "Same").await.unwrap());
        assert!(!mutator.rename_deck(&deck, "  Same  ").await.unwrap());
        assert!(!mutator.rename_deck(&deck, "   ").await.unwrap());

        assert_eq!(store.write_calls(), writes);
    }

    #[tokio::test]
    async fn test_toggle_favorite_twice_writes_twice() {
        let (store, mutator) = setup();
        let decks = CollectionPath::root("decks").unwrap();
        // favorite absent, as in documents written before the field existed
        let doc = store
            .add(&decks, Fields::new().set("name", "Legacy").set("userId", "alice"))
            .await
            .unwrap();
        let writes = store.write_calls();

        let deck = load_deck(&store, &doc);
        assert!(mutator.toggle_deck_favorite(&deck).await.unwrap());

        let deck = load_deck(&store, &doc);
        assert!(!mutator.toggle_deck_favorite(&deck).await.unwrap());

        assert!(!load_deck(&store, &doc).favorite);
        assert_eq!(store.write_calls(), writes + 2);
    }

    #[tokio::test]
    async fn test_create_card_defaults_date_to_today() {
        let (store, mutator) = setup();

        let doc = mutator
            .create_card(Some("d1"), &draft("Borrowing", None))
            .await
            .unwrap();

        let card = load_card(&store, &doc);
        assert_eq!(card.date, "2026-03-04");
        assert_eq!(card.deck_id, "d1");
        assert_eq!(card.title, "Borrowing");
        assert!(card.created_at.is_some());
        assert!(card.updated_at.is_none());
    }

    #[tokio::test]
    async fn test_create_card_empty_date_counts_as_omitted() {
        let (store, mutator) = setup();

        let doc = mutator
            .create_card(Some("d1"), &draft("Traits", Some("")))
            .await
            .unwrap();

        assert_eq!(load_card(&store, &doc).date, mutator.today());
    }

    #[tokio::test]
    async fn test_create_card_keeps_given_date() {
        let (store, mutator) = setup();

        let doc = mutator
            .create_card(Some("d1"), &draft("Lifetimes", Some("2025-12-24")))
            .await
            .unwrap();

        assert_eq!(load_card(&store, &doc).date, "2025-12-24");
    }

    #[tokio::test]
    async fn test_create_card_validation() {
        let (store, mutator) = setup();

        let empty_title = mutator.create_card(Some("d1"), &draft("  ", None)).await;
        let no_deck = mutator.create_card(None, &draft("Title", None)).await;
        let blank_deck = mutator.create_card(Some(" "), &draft("Title", None)).await;
        let bad_date = mutator
            .create_card(Some("d1"), &draft("Title", Some("04/03/2026")))
            .await;

        for result in [empty_title, no_deck, blank_deck, bad_date] {
            assert!(result.unwrap_err().is_validation());
        }
        assert_eq!(store.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_edit_card_stamps_updated_at() {
        let (store, mutator) = setup();
        let doc = mutator
            .create_card(Some("d1"), &draft("Draft", Some("2026-01-01")))
            .await
            .unwrap();

        mutator
            .edit_card(Some("d1"), doc.id(), &draft(" Final ", None))
            .await
            .unwrap();

        let card = load_card(&store, &doc);
        assert_eq!(card.title, "Final");
        assert_eq!(card.date, "2026-03-04");
        assert!(card.created_at.is_some());
        assert_eq!(card.updated_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn test_edit_card_rejects_empty_title() {
        let (store, mutator) = setup();
        let doc = mutator
            .create_card(Some("d1"), &draft("Keep", None))
            .await
            .unwrap();
        let writes = store.write_calls();

        let result = mutator.edit_card(Some("d1"), doc.id(), &draft("", None)).await;

        assert!(result.unwrap_err().is_validation());
        assert_eq!(store.write_calls(), writes);
        assert_eq!(load_card(&store, &doc).title, "Keep");
    }

    #[tokio::test]
    async fn test_toggle_card_favorite() {
        let (store, mutator) = setup();
        let doc = mutator
            .create_card(Some("d1"), &draft("Star me", None))
            .await
            .unwrap();

        let card = load_card(&store, &doc);
        assert!(mutator.toggle_card_favorite(&card).await.unwrap());
        assert!(load_card(&store, &doc).favorite);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_entity_unchanged() {
        let (store, mutator) = setup();
        let doc = mutator.create_deck("Stable", Some(&alice())).await.unwrap();
        let deck = load_deck(&store, &doc);

        store.fail_writes(true);
        let result = mutator.rename_deck(&deck, "Changed").await;

        assert!(result.unwrap_err().is_store_failure());
        assert_eq!(load_deck(&store, &doc).name, "Stable");
    }

    #[tokio::test]
    async fn test_create_memo() {
        let (store, mutator) = setup();

        assert!(mutator.create_memo("  ").await.unwrap_err().is_validation());
        let doc = mutator.create_memo("Buy milk").await.unwrap();

        assert_eq!(store.get(&doc).unwrap().get("text"), Some(&json!("Buy milk")));
        assert_eq!(store.write_calls(), 1);
    }
}
