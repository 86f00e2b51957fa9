//! In-process document store
//!
//! Keeps every collection in memory and notifies listeners synchronously
//! after each write. Faults can be injected to simulate a failing
//! backend: rejected reads, a rejected batch or single delete, rejected
//! writes, denied or revoked listeners.

use super::listeners::ListenerRegistry;
use super::{CollectionPath, Document, DocumentRef, DocumentStore, Fields, Listener, Query};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

type Collection = BTreeMap<String, Map<String, Value>>;

#[derive(Default)]
struct Faults {
    fail_next_batch: bool,
    fail_next_delete: bool,
    fail_writes: bool,
    fail_reads: bool,
    denied_collections: HashSet<CollectionPath>,
}

/// In-memory [`DocumentStore`]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<CollectionPath, Collection>>,
    listeners: ListenerRegistry,
    faults: Mutex<Faults>,
    write_calls: AtomicU64,
    clock: fn() -> DateTime<Utc>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    /// Use a fixed clock for server timestamps
    pub fn with_clock(clock: fn() -> DateTime<Utc>) -> Self {
        Self {
            collections: Mutex::new(BTreeMap::new()),
            listeners: ListenerRegistry::new(),
            faults: Mutex::new(Faults::default()),
            write_calls: AtomicU64::new(0),
            clock,
        }
    }

    /// Number of write calls received (add, update, delete, batch),
    /// including ones that failed
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Number of active listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of documents currently in a collection
    pub fn count(&self, collection: &CollectionPath) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Read a single document
    pub fn get(&self, doc: &DocumentRef) -> Option<Document> {
        self.collections
            .lock()
            .get(doc.collection())
            .and_then(|c| c.get(doc.id()))
            .map(|fields| Document {
                reference: doc.clone(),
                fields: fields.clone(),
            })
    }

    /// Reject the next `delete_batch` call without applying any of it
    pub fn fail_next_batch(&self) {
        self.faults.lock().fail_next_batch = true;
    }

    /// Reject the next single-document `delete` call
    pub fn fail_next_delete(&self) {
        self.faults.lock().fail_next_delete = true;
    }

    /// Reject every one-shot collection read until turned off again
    pub fn fail_reads(&self, fail: bool) {
        self.faults.lock().fail_reads = fail;
    }

    /// Reject every write until turned off again
    pub fn fail_writes(&self, fail: bool) {
        self.faults.lock().fail_writes = fail;
    }

    /// Refuse new listeners on a collection
    pub fn deny_listen(&self, collection: &CollectionPath) {
        self.faults.lock().denied_collections.insert(collection.clone());
    }

    /// Terminate every live listener on a collection with an error
    pub fn revoke(&self, collection: &CollectionPath, message: &str) {
        self.listeners.fail(collection, message);
    }

    fn begin_write(&self) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.lock().fail_writes {
            return Err(AppError::Unavailable("writes are failing".to_string()));
        }
        Ok(())
    }

    fn snapshot(
        collections: &BTreeMap<CollectionPath, Collection>,
        query: &Query,
    ) -> Vec<Document> {
        let Some(docs) = collections.get(query.collection()) else {
            return Vec::new();
        };
        query.apply(docs.iter().map(|(id, fields)| Document {
            reference: DocumentRef {
                collection: query.collection().clone(),
                id: id.clone(),
            },
            fields: fields.clone(),
        }))
    }

    fn notify(
        &self,
        collections: &BTreeMap<CollectionPath, Collection>,
        collection: &CollectionPath,
    ) {
        self.listeners
            .publish(collection, |query| Self::snapshot(collections, query));
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<DocumentRef> {
        self.begin_write()?;

        let doc = collection.doc(&Uuid::new_v4().simple().to_string())?;
        let mut collections = self.collections.lock();
        collections
            .entry(collection.clone())
            .or_default()
            .insert(doc.id().to_string(), fields.resolve((self.clock)()));
        self.notify(&collections, collection);

        tracing::debug!("Added document: {}", doc);
        Ok(doc)
    }

    async fn update(&self, doc: &DocumentRef, fields: Fields) -> Result<()> {
        self.begin_write()?;

        let mut collections = self.collections.lock();
        let existing = collections
            .get_mut(doc.collection())
            .and_then(|c| c.get_mut(doc.id()))
            .ok_or_else(|| AppError::NotFound(doc.path()))?;
        existing.extend(fields.resolve((self.clock)()));
        self.notify(&collections, doc.collection());

        tracing::debug!("Updated document: {}", doc);
        Ok(())
    }

    async fn delete(&self, doc: &DocumentRef) -> Result<()> {
        self.begin_write()?;
        {
            let mut faults = self.faults.lock();
            if faults.fail_next_delete {
                faults.fail_next_delete = false;
                return Err(AppError::Unavailable(format!("delete of {} failed", doc)));
            }
        }

        let mut collections = self.collections.lock();
        let removed = collections
            .get_mut(doc.collection())
            .and_then(|c| c.remove(doc.id()))
            .is_some();
        if removed {
            self.notify(&collections, doc.collection());
        }

        tracing::debug!("Deleted document: {}", doc);
        Ok(())
    }

    async fn get_all(&self, collection: &CollectionPath) -> Result<Vec<Document>> {
        if self.faults.lock().fail_reads {
            return Err(AppError::Unavailable(format!("read of {} failed", collection)));
        }

        let collections = self.collections.lock();
        Ok(Self::snapshot(&collections, &Query::new(collection.clone())))
    }

    async fn delete_batch(&self, docs: &[DocumentRef]) -> Result<()> {
        self.begin_write()?;
        {
            let mut faults = self.faults.lock();
            if faults.fail_next_batch {
                faults.fail_next_batch = false;
                return Err(AppError::Unavailable("batch commit failed".to_string()));
            }
        }

        let mut collections = self.collections.lock();
        let mut touched: Vec<&CollectionPath> = Vec::new();
        for doc in docs {
            if let Some(c) = collections.get_mut(doc.collection()) {
                if c.remove(doc.id()).is_some() && !touched.contains(&doc.collection()) {
                    touched.push(doc.collection());
                }
            }
        }
        for collection in touched {
            self.notify(&collections, collection);
        }

        tracing::debug!("Deleted batch of {} documents", docs.len());
        Ok(())
    }

    async fn listen(&self, query: &Query) -> Result<Listener> {
        if self
            .faults
            .lock()
            .denied_collections
            .contains(query.collection())
        {
            return Err(AppError::PermissionDenied(format!(
                "listen on {}",
                query.collection()
            )));
        }

        let collections = self.collections.lock();
        let initial = Self::snapshot(&collections, query);
        Ok(self.listeners.register(query.clone(), initial))
    }
}
