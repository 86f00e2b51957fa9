//! Live queries
//!
//! [`subscribe`] is the low-level primitive: a stream of full snapshots
//! plus a [`CancelHandle`]. [`LiveView`] owns at most one subscription
//! at a time, keyed by a filter parameter (signed-in user, selected
//! deck). Changing the parameter cancels the old subscription before the
//! new one starts, and dropping the view cancels whatever is active.
//! A view driven by [`LiveView::follow`] is torn down through its
//! [`FollowHandle`].
//!
//! Snapshots always replace the previous state. Nothing is merged
//! locally: a write shows up only when the store delivers the next
//! snapshot.

use crate::config::{
    CARDS_COLLECTION, DECKS_COLLECTION, FIELD_CREATED_AT, FIELD_OWNER, MEMOS_COLLECTION,
};
use crate::error::{AppError, Result};
use crate::models::{FromDocument, UserId};
use crate::store::{
    CollectionPath, Direction, Document, DocumentStore, ListenerRegistration, Query, SnapshotEvent,
};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Query for the decks owned by `user`
pub fn decks_owned_by(user: &UserId) -> Result<Query> {
    Ok(Query::new(CollectionPath::root(DECKS_COLLECTION)?).where_eq(FIELD_OWNER, user.as_str()))
}

/// Query for every card nested under a deck
pub fn cards_in_deck(deck_id: &str) -> Result<Query> {
    let cards = CollectionPath::root(DECKS_COLLECTION)?
        .doc(deck_id)?
        .sub_collection(CARDS_COLLECTION)?;
    Ok(Query::new(cards))
}

/// Query for all memos, newest first
pub fn recent_memos() -> Result<Query> {
    Ok(Query::new(CollectionPath::root(MEMOS_COLLECTION)?)
        .order_by(FIELD_CREATED_AT, Direction::Descending))
}

/// An event of a typed live query
#[derive(Debug)]
pub enum QueryEvent<T> {
    Snapshot(Vec<T>),
    /// Terminal; the stream ends after this
    Error(AppError),
}

/// Decode a snapshot, dropping documents that fail validation
pub fn decode_snapshot<T: FromDocument>(docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match T::from_document(doc) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping document {}: {}", doc.reference, e);
                None
            }
        })
        .collect()
}

/// Stream of typed snapshots for one subscription
pub struct SnapshotStream<T> {
    events: mpsc::UnboundedReceiver<SnapshotEvent>,
    cancelled: Arc<AtomicBool>,
    finished: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromDocument> SnapshotStream<T> {
    /// Next event, or `None` once cancelled or after a terminal error
    pub async fn next(&mut self) -> Option<QueryEvent<T>> {
        if self.finished || self.cancelled.load(Ordering::SeqCst) {
            return None;
        }

        let event = self.events.recv().await;
        if self.cancelled.load(Ordering::SeqCst) {
            self.finished = true;
            return None;
        }

        match event {
            Some(SnapshotEvent::Snapshot(docs)) => {
                tracing::debug!("Snapshot with {} documents", docs.len());
                Some(QueryEvent::Snapshot(decode_snapshot(&docs)))
            }
            Some(SnapshotEvent::Error(message)) => {
                self.finished = true;
                Some(QueryEvent::Error(AppError::Subscription(message)))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

/// Ends a subscription. Cancelling twice is harmless, and dropping the
/// handle cancels.
#[must_use = "dropping the handle cancels the subscription"]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    registration: ListenerRegistration,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            tracing::debug!("Cancelling live query");
        }
        self.registration.remove();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Subscribe to a query, yielding typed snapshots until cancelled
pub async fn subscribe<T: FromDocument>(
    store: &dyn DocumentStore,
    query: &Query,
) -> Result<(SnapshotStream<T>, CancelHandle)> {
    let listener = store.listen(query).await?;
    let cancelled = Arc::new(AtomicBool::new(false));

    tracing::debug!("Subscribed to {}", query.collection());

    let stream = SnapshotStream {
        events: listener.events,
        cancelled: cancelled.clone(),
        finished: false,
        _marker: PhantomData,
    };
    let handle = CancelHandle {
        cancelled,
        registration: listener.registration,
    };
    Ok((stream, handle))
}

/// What a view currently shows
#[derive(Debug, Clone, PartialEq)]
pub enum ViewStatus<T> {
    /// No filter parameter; nothing is subscribed
    Idle,
    /// Subscribed, waiting for the first snapshot
    Loading,
    Ready(Vec<T>),
    /// The subscription ended with an error and will not retry
    Failed(String),
}

/// View state tagged with the subscription generation that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState<T> {
    pub generation: u64,
    pub status: ViewStatus<T>,
}

impl<T> ViewState<T> {
    /// Current items; empty unless a snapshot has arrived
    pub fn items(&self) -> &[T] {
        match &self.status {
            ViewStatus::Ready(items) => items,
            _ => &[],
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.status, ViewStatus::Ready(_))
    }
}

type Scope<P> = Box<dyn Fn(&P) -> Result<Query> + Send + Sync>;

struct Active {
    handle: CancelHandle,
    task: JoinHandle<()>,
}

impl Active {
    fn stop(self) {
        self.handle.cancel();
        self.task.abort();
    }
}

/// A live query owned by one view, re-targeted by a filter parameter
pub struct LiveView<P, T> {
    store: Arc<dyn DocumentStore>,
    scope: Scope<P>,
    param: Option<P>,
    state: watch::Sender<ViewState<T>>,
    active: Arc<Mutex<Option<Active>>>,
}

impl<P, T> LiveView<P, T>
where
    P: Clone + PartialEq + Send + Sync + 'static,
    T: FromDocument + Clone + Send + Sync + 'static,
{
    pub fn new<F>(store: Arc<dyn DocumentStore>, scope: F) -> Self
    where
        F: Fn(&P) -> Result<Query> + Send + Sync + 'static,
    {
        let (state, _) = watch::channel(ViewState {
            generation: 0,
            status: ViewStatus::Idle,
        });
        Self {
            store,
            scope: Box::new(scope),
            param: None,
            state,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn watch(&self) -> watch::Receiver<ViewState<T>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ViewState<T> {
        self.state.borrow().clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.state.borrow().items().to_vec()
    }

    pub fn param(&self) -> Option<&P> {
        self.param.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Point the view at a new parameter.
    ///
    /// The previous subscription is cancelled first. With `None` the view
    /// stays idle and issues no request. Setting the parameter it already
    /// has is a no-op unless the last subscription failed.
    pub async fn set_param(&mut self, param: Option<P>) -> Result<()> {
        let failed = matches!(self.state.borrow().status, ViewStatus::Failed(_));
        if self.param == param && self.is_subscribed() && !failed {
            return Ok(());
        }

        self.cancel();
        self.param = param.clone();
        let Some(param) = param else {
            return Ok(());
        };

        let generation = advance(&self.state, ViewStatus::Loading);
        let query = match (self.scope)(&param) {
            Ok(query) => query,
            Err(e) => {
                publish(&self.state, generation, ViewStatus::Failed(e.to_string()));
                return Err(e);
            }
        };

        match subscribe::<T>(self.store.as_ref(), &query).await {
            Ok((stream, handle)) => {
                let task = tokio::spawn(forward(stream, self.state.clone(), generation));
                *self.active.lock() = Some(Active { handle, task });
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to subscribe to {}: {}", query.collection(), e);
                publish(&self.state, generation, ViewStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Cancel the active subscription and fall back to idle. Idempotent.
    pub fn cancel(&mut self) {
        stop_active(&self.active);
        advance(&self.state, ViewStatus::Idle);
    }

    /// Keep the view pointed at whatever `params` holds, re-subscribing on
    /// every change. The view lives until the returned handle is cancelled
    /// or dropped, or the parameter source goes away.
    pub fn follow(mut self, mut params: watch::Receiver<Option<P>>) -> FollowHandle<T> {
        let state = self.state.clone();
        let active = self.active.clone();
        let task = tokio::spawn(async move {
            loop {
                let param = params.borrow_and_update().clone();
                if let Err(e) = self.set_param(param).await {
                    tracing::error!("Live query subscription failed: {}", e);
                }
                if params.changed().await.is_err() {
                    break;
                }
            }
        });
        FollowHandle {
            state,
            active,
            task,
            cancelled: AtomicBool::new(false),
        }
    }
}

impl<P, T> Drop for LiveView<P, T> {
    fn drop(&mut self) {
        stop_active(&self.active);
    }
}

fn stop_active(active: &Mutex<Option<Active>>) {
    let current = active.lock().take();
    if let Some(current) = current {
        current.stop();
    }
}

/// Start a new generation with `status`; returns the generation number
fn advance<T>(state: &watch::Sender<ViewState<T>>, status: ViewStatus<T>) -> u64 {
    let mut generation = 0;
    state.send_modify(|state| {
        state.generation += 1;
        state.status = status;
        generation = state.generation;
    });
    generation
}

/// Write `status` only if `generation` is still the current one.
/// Returns false once the subscription has been superseded.
fn publish<T>(state: &watch::Sender<ViewState<T>>, generation: u64, status: ViewStatus<T>) -> bool {
    let mut current = false;
    state.send_if_modified(|state| {
        if state.generation != generation {
            return false;
        }
        state.status = status;
        current = true;
        true
    });
    current
}

async fn forward<T: FromDocument>(
    mut stream: SnapshotStream<T>,
    state: watch::Sender<ViewState<T>>,
    generation: u64,
) {
    while let Some(event) = stream.next().await {
        let status = match event {
            QueryEvent::Snapshot(items) => ViewStatus::Ready(items),
            QueryEvent::Error(e) => {
                tracing::error!("Live query stopped: {}", e);
                ViewStatus::Failed(e.to_string())
            }
        };
        if !publish(&state, generation, status) {
            break;
        }
    }
}

/// A [`LiveView`] driven by a parameter channel. Cancelling or
/// dropping the handle releases the store listener immediately and
/// stops following the parameter.
pub struct FollowHandle<T> {
    state: watch::Sender<ViewState<T>>,
    active: Arc<Mutex<Option<Active>>>,
    task: JoinHandle<()>,
    cancelled: AtomicBool,
}

impl<T> FollowHandle<T> {
    /// Stop following and fall back to idle. Idempotent.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.task.abort();
        stop_active(&self.active);
        advance(&self.state, ViewStatus::Idle);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl<T: Clone> FollowHandle<T> {
    pub fn watch(&self) -> watch::Receiver<ViewState<T>> {
        self.state.subscribe()
    }

    pub fn items(&self) -> Vec<T> {
        self.state.borrow().items().to_vec()
    }
}

impl<T> Drop for FollowHandle<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}
