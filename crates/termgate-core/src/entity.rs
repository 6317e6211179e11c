//! Entity kinds and persisted records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Kinds of entity exposed through the search facades
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Refset,
    Translation,
    Concept,
    Edition,
    Team,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Project,
        EntityKind::Refset,
        EntityKind::Translation,
        EntityKind::Concept,
        EntityKind::Edition,
        EntityKind::Team,
        EntityKind::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Refset => "refset",
            Self::Translation => "translation",
            Self::Concept => "concept",
            Self::Edition => "edition",
            Self::Team => "team",
            Self::User => "user",
        }
    }

    /// Analysed text fields of this kind's index that accept prefix wildcards.
    ///
    /// An empty slice means the index only holds keyword fields and bare
    /// terms must be matched exactly.
    pub fn wildcard_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Project | Self::Refset | Self::Translation => &["name", "description"],
            Self::Concept => &["name"],
            Self::Edition => &["name", "shortName"],
            Self::Team => &["name", "organization"],
            Self::User => &[],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidRequest(format!("Unknown entity kind '{}'", s)))
    }
}

/// A persisted entity as seen through the store interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub kind: EntityKind,
    /// Entity body; the schema belongs to the persistence layer
    pub payload: serde_json::Value,
}

impl Record {
    pub fn new(kind: EntityKind, id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
        }
    }
}

/// Page of records returned by a store search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultList {
    pub items: Vec<Record>,

    /// Total count of matching records, before pagination
    pub total_count: u64,
}

impl ResultList {
    pub fn new(items: Vec<Record>, total_count: u64) -> Self {
        Self { items, total_count }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
