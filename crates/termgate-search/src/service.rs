//! Entity service facade over a persistence store

use std::sync::Arc;
use termgate_core::{
    EntityKind, Error, PersistenceStore, Record, Result, ResultList, SearchRequest,
    StoreTransaction,
};
use tracing::{debug, instrument, warn};

use crate::normalize::normalize;

/// Search and CRUD over every entity kind held by one store
pub struct EntityService<S: PersistenceStore> {
    store: Arc<S>,
}

impl<S: PersistenceStore> Clone for EntityService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: PersistenceStore> EntityService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Normalise the request and run it against the store
    #[instrument(skip(self, request), fields(kind = %kind))]
    pub async fn search(&self, kind: EntityKind, request: &SearchRequest) -> Result<ResultList> {
        let normalized = normalize(request, kind);
        debug!(query = %normalized.query_string, "Searching store");

        let results = self
            .store
            .find(&normalized.query_string, &normalized.pagination, kind)
            .await?;

        debug!(
            returned = results.items.len(),
            total = results.total_count,
            "Search complete"
        );
        Ok(results)
    }

    /// Get a record, failing with `Error::NotFound` when it does not exist
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn get(&self, kind: EntityKind, id: &str) -> Result<Record> {
        self.store
            .get(kind, id)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    #[instrument(skip(self, record), fields(kind = %record.kind, id = %record.id))]
    pub async fn add(&self, record: Record) -> Result<Record> {
        let mut tx = self.store.begin().await?;
        let outcome = tx.add(record).await;
        finish(tx, outcome).await
    }

    /// Update a record; the record must already exist
    #[instrument(skip(self, record), fields(kind = %record.kind, id = %record.id))]
    pub async fn update(&self, record: Record) -> Result<Record> {
        if self.store.get(record.kind, &record.id).await?.is_none() {
            return Err(Error::NotFound {
                kind: record.kind,
                id: record.id,
            });
        }

        let mut tx = self.store.begin().await?;
        let outcome = tx.update(record).await;
        finish(tx, outcome).await
    }

    /// Remove a record, failing with `Error::NotFound` when it does not exist
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn remove(&self, kind: EntityKind, id: &str) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let outcome = match tx.remove(kind, id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::NotFound {
                kind,
                id: id.to_string(),
            }),
            Err(e) => Err(e),
        };
        finish(tx, outcome).await
    }
}

/// Commit on success, roll back on failure
async fn finish<T>(tx: Box<dyn StoreTransaction>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback failed after {}: {}", e, rollback_err);
            }
            Err(e)
        }
    }
}
