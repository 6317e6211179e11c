//! Termgate Core Types and Traits
//!
//! This crate provides the fundamental types and traits shared by the
//! terminology gateway and the entity services built on top of it:
//! - Search request / normalized query types
//! - Entity kinds and records
//! - Persistence store collaborator traits
//! - Core error types

pub mod entity;
pub mod error;
pub mod search;
pub mod store;

pub use entity::{EntityKind, Record, ResultList};
pub use error::{Error, Result};
pub use search::{NormalizedQuery, PaginationSpec, SearchRequest};
pub use store::{PersistenceStore, StoreTransaction};
