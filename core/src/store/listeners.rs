//! Live query listeners
//!
//! Every store keeps a [`ListenerRegistry`]. A registration delivers full
//! snapshots through an unbounded channel and is removed either
//! explicitly, when its handle is dropped, or when the store reports a
//! terminal error for its collection.

use super::{CollectionPath, Document, Query};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// One delivery from a live query
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent {
    /// The complete current result set; replaces any previous one
    Snapshot(Vec<Document>),
    /// The query failed. No further events follow.
    Error(String),
}

struct Entry {
    id: u64,
    query: Query,
    tx: mpsc::UnboundedSender<SnapshotEvent>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    entries: Vec<Entry>,
}

/// Active listeners of one store
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a query and deliver its initial snapshot.
    ///
    /// Callers must hold whatever lock orders their writes so that no
    /// change slips in between computing `initial` and registering.
    pub fn register(&self, query: Query, initial: Vec<Document>) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so the initial send cannot fail.
        let _ = tx.send(SnapshotEvent::Snapshot(initial));

        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.entries.push(Entry { id, query, tx });

        tracing::debug!("Registered listener {} ({} active)", id, inner.entries.len());

        Listener {
            events: rx,
            registration: ListenerRegistration {
                id,
                registry: Arc::downgrade(&self.inner),
                removed: AtomicBool::new(false),
            },
        }
    }

    /// Whether anything listens on the collection
    pub fn has_listeners(&self, collection: &CollectionPath) -> bool {
        self.inner
            .lock()
            .entries
            .iter()
            .any(|e| e.query.collection() == collection)
    }

    /// Push a fresh snapshot to every listener on `collection`.
    /// Listeners whose receiver has gone away are dropped.
    pub fn publish<F>(&self, collection: &CollectionPath, snapshot_for: F)
    where
        F: Fn(&Query) -> Vec<Document>,
    {
        let mut inner = self.inner.lock();
        inner.entries.retain(|entry| {
            if entry.query.collection() != collection {
                return true;
            }
            let snapshot = snapshot_for(&entry.query);
            entry.tx.send(SnapshotEvent::Snapshot(snapshot)).is_ok()
        });
    }

    /// Report a terminal error to every listener on `collection` and
    /// drop them
    pub fn fail(&self, collection: &CollectionPath, message: &str) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|entry| {
            if entry.query.collection() != collection {
                return true;
            }
            tracing::debug!("Failing listener {}: {}", entry.id, message);
            let _ = entry.tx.send(SnapshotEvent::Error(message.to_string()));
            false
        });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A live subscription: an event receiver plus the handle that ends it
pub struct Listener {
    pub events: mpsc::UnboundedReceiver<SnapshotEvent>,
    pub registration: ListenerRegistration,
}

impl Listener {
    pub async fn recv(&mut self) -> Option<SnapshotEvent> {
        self.events.recv().await
    }
}

/// Handle to a registered listener. Removing it stops delivery and
/// closes the event channel; dropping it does the same.
pub struct ListenerRegistration {
    id: u64,
    registry: Weak<Mutex<RegistryInner>>,
    removed: AtomicBool,
}

impl ListenerRegistration {
    /// Idempotent
    pub fn remove(&self) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.registry.upgrade() {
            let mut inner = inner.lock();
            inner.entries.retain(|e| e.id != self.id);
            tracing::debug!("Removed listener {} ({} active)", self.id, inner.entries.len());
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}
