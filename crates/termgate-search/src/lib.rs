//! Termgate Search
//!
//! Search normalisation shared by every entity search, and the services
//! built on it:
//! - [`normalize`]: search request to backend query string and pagination
//! - [`EntityService`]: search and CRUD over a persistence store
//! - [`RemoteSearch`]: search and fetch through the terminology gateway

pub mod normalize;
pub mod remote;
pub mod service;

pub use normalize::{ACTIVE_CLAUSE, expand_wildcards, normalize};
pub use remote::RemoteSearch;
pub use service::EntityService;
