//! Common test utilities for integration tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use termgate_core::{
    EntityKind, Error as CoreError, PaginationSpec, PersistenceStore, Record, ResultList,
    StoreTransaction,
};

type Records = HashMap<(EntityKind, String), Record>;

/// In-memory persistence store for testing
///
/// Understands just enough of the query language for the tests: an empty
/// query matches everything and a top-level `active:true` keeps records whose
/// payload has `"active": true`.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct InMemoryStore {
    records: Arc<Mutex<Records>>,
    queries: Arc<Mutex<Vec<(String, PaginationSpec, EntityKind)>>>,
}

#[allow(dead_code)]
impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: Record) {
        self.records
            .lock()
            .unwrap()
            .insert((record.kind, record.id.clone()), record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Every `find` call seen so far
    pub fn queries(&self) -> Vec<(String, PaginationSpec, EntityKind)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>, CoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(kind, id.to_string()))
            .cloned())
    }

    async fn find(
        &self,
        query: &str,
        pagination: &PaginationSpec,
        kind: EntityKind,
    ) -> Result<ResultList, CoreError> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), pagination.clone(), kind));

        let active_only = query.split_whitespace().any(|term| term == "active:true");
        let mut matches: Vec<Record> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|record| record.kind == kind)
            .filter(|record| !active_only || record.payload["active"] == Value::Bool(true))
            .cloned()
            .collect();

        let sort_field = pagination.sort_field.as_deref().unwrap_or("id");
        matches.sort_by(|a, b| {
            let a = a.payload[sort_field].to_string();
            let b = b.payload[sort_field].to_string();
            a.cmp(&b)
        });
        if !pagination.ascending {
            matches.reverse();
        }

        let total = matches.len() as u64;
        let offset = pagination.offset.unwrap_or(0) as usize;
        let limit = pagination.limit.map_or(usize::MAX, |limit| limit.get() as usize);
        let items = matches.into_iter().skip(offset).take(limit).collect();

        Ok(ResultList::new(items, total))
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, CoreError> {
        Ok(Box::new(InMemoryTransaction {
            records: self.records.clone(),
            staged: self.records.lock().unwrap().clone(),
        }))
    }
}

/// Works on a copy of the records and swaps it in on commit
struct InMemoryTransaction {
    records: Arc<Mutex<Records>>,
    staged: Records,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn add(&mut self, record: Record) -> Result<Record, CoreError> {
        let key = (record.kind, record.id.clone());
        if self.staged.contains_key(&key) {
            return Err(CoreError::Store(format!(
                "{} {} already exists",
                record.kind, record.id
            )));
        }
        self.staged.insert(key, record.clone());
        Ok(record)
    }

    async fn update(&mut self, record: Record) -> Result<Record, CoreError> {
        self.staged
            .insert((record.kind, record.id.clone()), record.clone());
        Ok(record)
    }

    async fn remove(&mut self, kind: EntityKind, id: &str) -> Result<bool, CoreError> {
        Ok(self.staged.remove(&(kind, id.to_string())).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), CoreError> {
        let InMemoryTransaction { records, staged } = *self;
        *records.lock().unwrap() = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), CoreError> {
        Ok(())
    }
}
