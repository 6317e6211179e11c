//! Generic search request and the normalized form handed to backends

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Search criteria supplied by a caller of an entity search
///
/// Every field is optional; unset pagination is left for the backend to
/// default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Free-text query in the backend query language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Restrict results to active (non-retired) records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_only: Option<bool>,

    /// Pagination: number of records to skip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,

    /// Pagination: maximum number of records to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<NonZeroU32>,

    /// Field to sort on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,

    /// Sort direction; descending when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ascending: Option<bool>,
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_active_only(mut self, active_only: bool) -> Self {
        self.active_only = Some(active_only);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Set the page size. A limit of zero leaves the limit unset.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = NonZeroU32::new(limit);
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort_field = Some(field.into());
        self.ascending = Some(ascending);
        self
    }
}

/// Offset/limit/sort parameters passed to a backend search call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<NonZeroU32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,

    #[serde(default)]
    pub ascending: bool,
}

/// Backend query string plus pagination, derived from a [`SearchRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedQuery {
    /// Query-language expression; empty matches every record of the kind
    pub query_string: String,
    pub pagination: PaginationSpec,
}

impl NormalizedQuery {
    pub fn is_match_all(&self) -> bool {
        self.query_string.is_empty()
    }
}
