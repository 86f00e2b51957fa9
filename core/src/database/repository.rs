//! SQLite-backed document store
//!
//! Each document is one row holding its fields as JSON text. Writes and
//! listener registration are serialized behind a gate, and listeners on
//! the touched collection get a fresh snapshot right after each commit,
//! so snapshots reach every listener in commit order.

use crate::error::{AppError, Result};
use crate::store::listeners::ListenerRegistry;
use crate::store::{CollectionPath, Document, DocumentRef, DocumentStore, Fields, Listener, Query};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(FromRow)]
struct DocumentRow {
    id: String,
    fields: String,
}

/// Repository for document storage
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    listeners: ListenerRegistry,
    gate: Arc<Mutex<()>>,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            listeners: ListenerRegistry::new(),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Number of active listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    async fn load_collection(&self, collection: &CollectionPath) -> Result<Vec<Document>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, fields FROM documents WHERE collection = ? ORDER BY id
            "#,
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let fields: Map<String, Value> = serde_json::from_str(&row.fields)?;
                Ok(Document {
                    reference: collection.doc(&row.id)?,
                    fields,
                })
            })
            .collect()
    }

    /// Push a fresh snapshot to listeners on `collection`. Must be called
    /// with the gate held.
    async fn publish(&self, collection: &CollectionPath) {
        if !self.listeners.has_listeners(collection) {
            return;
        }
        match self.load_collection(collection).await {
            Ok(docs) => self
                .listeners
                .publish(collection, |query| query.apply(docs.iter().cloned())),
            Err(e) => {
                tracing::error!("Failed to refresh listeners on {}: {}", collection, e);
                self.listeners.fail(collection, &e.to_string());
            }
        }
    }
}

#[async_trait]
impl DocumentStore for Repository {
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<DocumentRef> {
        let _gate = self.gate.lock().await;

        let doc = collection.doc(&Uuid::new_v4().simple().to_string())?;
        let now = Utc::now();
        let json = serde_json::to_string(&fields.resolve(now))?;

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, fields, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection.as_str())
        .bind(doc.id())
        .bind(&json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Created document: {}", doc);
        self.publish(collection).await;
        Ok(doc)
    }

    async fn update(&self, doc: &DocumentRef, fields: Fields) -> Result<()> {
        let _gate = self.gate.lock().await;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let existing: String = sqlx::query_scalar(
            r#"
            SELECT fields FROM documents WHERE collection = ? AND id = ?
            "#,
        )
        .bind(doc.collection().as_str())
        .bind(doc.id())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(doc.path()))?;

        let mut merged: Map<String, Value> = serde_json::from_str(&existing)?;
        merged.extend(fields.resolve(now));

        sqlx::query(
            r#"
            UPDATE documents SET fields = ?, updated_at = ? WHERE collection = ? AND id = ?
            "#,
        )
        .bind(serde_json::to_string(&merged)?)
        .bind(now)
        .bind(doc.collection().as_str())
        .bind(doc.id())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!("Updated document: {}", doc);
        self.publish(doc.collection()).await;
        Ok(())
    }

    async fn delete(&self, doc: &DocumentRef) -> Result<()> {
        let _gate = self.gate.lock().await;

        let rows = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(doc.collection().as_str())
            .bind(doc.id())
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::debug!("Deleted document: {} ({} rows)", doc, rows);
        if rows > 0 {
            self.publish(doc.collection()).await;
        }
        Ok(())
    }

    async fn get_all(&self, collection: &CollectionPath) -> Result<Vec<Document>> {
        self.load_collection(collection).await
    }

    async fn delete_batch(&self, docs: &[DocumentRef]) -> Result<()> {
        let _gate = self.gate.lock().await;

        let mut tx = self.pool.begin().await?;
        for doc in docs {
            sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
                .bind(doc.collection().as_str())
                .bind(doc.id())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!("Deleted batch of {} documents", docs.len());

        let mut touched: Vec<&CollectionPath> = Vec::new();
        for doc in docs {
            if !touched.contains(&doc.collection()) {
                touched.push(doc.collection());
            }
        }
        for collection in touched {
            self.publish(collection).await;
        }
        Ok(())
    }

    async fn listen(&self, query: &Query) -> Result<Listener> {
        let _gate = self.gate.lock().await;

        let docs = self.load_collection(query.collection()).await?;
        Ok(self.listeners.register(query.clone(), query.apply(docs)))
    }
}
