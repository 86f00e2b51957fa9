//! Domain models
//!
//! Documents coming out of the store are schema-less. They are turned
//! into typed records here, at the boundary: missing optional fields get
//! their defaults, documents missing required fields are rejected.

use crate::error::{AppError, Result};
use crate::slug::slugify;
use crate::store::Document;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque identifier of a signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named collection of cards owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(rename = "userId")]
    pub owner_id: UserId,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Deck {
    /// The label shown for the deck: its name, or its id when unnamed
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A single rich-text note inside a deck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    /// Taken from the document path, never stored as a field
    #[serde(default)]
    pub deck_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: String,
    /// HTML produced by the editor; opaque here
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A quick free-text memo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memo {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Input for creating or editing a card
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CardDraft {
    pub title: String,
    /// `YYYY-MM-DD`; today's UTC date when absent or empty
    pub date: Option<String>,
    pub content: String,
}

/// Conversion from a stored document into a typed record
pub trait FromDocument: Sized {
    fn from_document(doc: &Document) -> Result<Self>;
}

fn decode<T: DeserializeOwned>(doc: &Document) -> Result<T> {
    let mut fields = doc.fields.clone();
    fields.insert("id".to_string(), Value::String(doc.id().to_string()));
    serde_json::from_value(Value::Object(fields)).map_err(|e| {
        AppError::Validation(format!("Malformed document {}: {}", doc.reference, e))
    })
}

impl FromDocument for Deck {
    fn from_document(doc: &Document) -> Result<Self> {
        let mut deck: Deck = decode(doc)?;
        if deck.slug.is_empty() {
            deck.slug = slugify(&deck.name);
        }
        Ok(deck)
    }
}

impl FromDocument for Card {
    fn from_document(doc: &Document) -> Result<Self> {
        let mut card: Card = decode(doc)?;
        card.deck_id = doc
            .reference
            .collection()
            .parent()
            .map(|deck| deck.id().to_string())
            .ok_or_else(|| {
                AppError::Validation(format!("Card {} is not nested in a deck", doc.reference))
            })?;
        Ok(card)
    }
}

impl FromDocument for Memo {
    fn from_document(doc: &Document) -> Result<Self> {
        decode(doc)
    }
}
