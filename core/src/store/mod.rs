//! Document store abstraction
//!
//! The application never talks to a concrete database directly. It sees
//! a hierarchical store of schema-less documents:
//! - collections addressed by path (`decks`, `decks/{id}/cards`)
//! - single-document add/update/delete
//! - one-shot collection reads
//! - an atomic multi-document delete
//! - live queries that deliver full snapshots on every change
//!
//! Two implementations exist: [`MemoryStore`] (in-process, with fault
//! injection for tests) and the SQLite-backed
//! [`Repository`](crate::database::Repository).

pub mod listeners;
pub mod memory;

pub use listeners::{Listener, ListenerRegistration, SnapshotEvent};
pub use memory::MemoryStore;

use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Path of a collection: an odd number of non-empty segments
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// A top-level collection such as `decks`
    pub fn root(name: &str) -> Result<Self> {
        validate_segment(name)?;
        Ok(Self(name.to_string()))
    }

    /// Parse a full collection path such as `decks/abc/cards`
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() % 2 == 0 {
            return Err(AppError::Validation(format!(
                "Not a collection path: {}",
                path
            )));
        }
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self(path.to_string()))
    }

    /// Reference to a document in this collection
    pub fn doc(&self, id: &str) -> Result<DocumentRef> {
        validate_segment(id)?;
        Ok(DocumentRef {
            collection: self.clone(),
            id: id.to_string(),
        })
    }

    /// The document this collection is nested under, if any
    pub fn parent(&self) -> Option<DocumentRef> {
        let (parent, _) = self.0.rsplit_once('/')?;
        let (collection, id) = parent.rsplit_once('/')?;
        Some(DocumentRef {
            collection: CollectionPath(collection.to_string()),
            id: id.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a single document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef {
    collection: CollectionPath,
    id: String,
}

impl DocumentRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// A collection nested under this document
    pub fn sub_collection(&self, name: &str) -> Result<CollectionPath> {
        validate_segment(name)?;
        Ok(CollectionPath(format!("{}/{}/{}", self.collection, self.id, name)))
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.trim().is_empty() || segment.contains('/') {
        return Err(AppError::Validation(format!(
            "Invalid path segment: {:?}",
            segment
        )));
    }
    Ok(())
}

/// A document as delivered by the store
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub reference: DocumentRef,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn id(&self) -> &str {
        self.reference.id()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// A value to write: either literal JSON or a placeholder the store
/// replaces with its own clock
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    ServerTimestamp,
}

/// Field values for a single write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), FieldValue::Value(value.into()));
        self
    }

    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.0.insert(field.to_string(), FieldValue::ServerTimestamp);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replace every server timestamp with `now` and produce storable JSON
    pub fn resolve(&self, now: DateTime<Utc>) -> Map<String, Value> {
        let stamp = server_time(now);
        self.0
            .iter()
            .map(|(field, value)| {
                let value = match value {
                    FieldValue::Value(v) => v.clone(),
                    FieldValue::ServerTimestamp => Value::String(stamp.clone()),
                };
                (field.clone(), value)
            })
            .collect()
    }
}

/// Wire form of a server-assigned timestamp
pub fn server_time(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A collection query with equality filters and an optional ordering
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: CollectionPath,
    filters: Vec<(String, Value)>,
    order: Option<(String, Direction)>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some((field.to_string(), direction));
        self
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if doc.reference.collection() != &self.collection {
            return false;
        }
        if let Some((field, _)) = &self.order {
            if !doc.fields.contains_key(field) {
                return false;
            }
        }
        self.filters
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }

    /// Filter and order a collection's documents into a snapshot
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        match &self.order {
            Some((field, direction)) => matched.sort_by(|a, b| {
                let ord = compare_values(a.get(field), b.get(field))
                    .then_with(|| a.id().cmp(b.id()));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            }),
            None => matched.sort_by(|a, b| a.id().cmp(b.id())),
        }

        matched
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
    };

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// The operations the application needs from a document store.
///
/// Writes are last-write-wins; there is no version check. A write only
/// becomes visible to callers through the next snapshot of a listener.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document with a store-assigned id
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<DocumentRef>;

    /// Merge fields into an existing document. Fails with `NotFound`
    /// if the document does not exist.
    async fn update(&self, doc: &DocumentRef, fields: Fields) -> Result<()>;

    /// Delete one document. Deleting a missing document succeeds.
    /// Nested collections are left untouched.
    async fn delete(&self, doc: &DocumentRef) -> Result<()>;

    /// One-time read of every document in a collection
    async fn get_all(&self, collection: &CollectionPath) -> Result<Vec<Document>>;

    /// Delete all given documents atomically: all or nothing
    async fn delete_batch(&self, docs: &[DocumentRef]) -> Result<()>;

    /// Subscribe to a query. The first event is the current snapshot.
    async fn listen(&self, query: &Query) -> Result<Listener>;
}
