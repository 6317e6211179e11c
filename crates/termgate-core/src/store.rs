//! Persistence store traits
//!
//! The entity store is an external collaborator. Reads go straight through
//! [`PersistenceStore`]; writes happen inside a [`StoreTransaction`] obtained
//! from [`PersistenceStore::begin`] and must end in `commit` or `rollback`.

use async_trait::async_trait;

use crate::{
    entity::{EntityKind, Record, ResultList},
    search::PaginationSpec,
    Result,
};

/// Persistence store trait
///
/// # Example
/// ```no_run
/// # use termgate_core::{EntityKind, PaginationSpec, PersistenceStore};
/// # async fn example(store: &dyn PersistenceStore) -> termgate_core::Result<()> {
/// let page = store
///     .find("name:heart* AND active:true", &PaginationSpec::default(), EntityKind::Refset)
///     .await?;
/// println!("{} matches", page.total_count);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Get a single record by ID
    ///
    /// Returns `Ok(None)` when no record of that kind has the ID.
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>>;

    /// Search records of a kind
    ///
    /// # Arguments
    /// * `query` - Backend query-language expression; empty matches all
    /// * `pagination` - Offset/limit/sort; unset values use store defaults
    /// * `kind` - Entity kind to search
    async fn find(
        &self,
        query: &str,
        pagination: &PaginationSpec,
        kind: EntityKind,
    ) -> Result<ResultList>;

    /// Begin a write transaction
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// Scoped write access to the store
#[async_trait]
pub trait StoreTransaction: Send {
    async fn add(&mut self, record: Record) -> Result<Record>;

    async fn update(&mut self, record: Record) -> Result<Record>;

    /// Remove a record; returns `false` when it did not exist
    async fn remove(&mut self, kind: EntityKind, id: &str) -> Result<bool>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
