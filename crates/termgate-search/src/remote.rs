//! Entity search served by the remote terminology server

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use termgate_core::{EntityKind, Error, NormalizedQuery, Record, Result, ResultList, SearchRequest};
use termgate_egress::{StatusCode, TerminologyGateway, Url};
use tracing::{debug, instrument};

use crate::normalize::normalize;

/// Page shape returned by the terminology server's search endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemotePage {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    total_count: Option<u64>,
}

/// Searches and fetches one entity kind through the gateway
#[derive(Debug, Clone)]
pub struct RemoteSearch {
    gateway: Arc<TerminologyGateway>,
    kind: EntityKind,
    path: String,
}

impl RemoteSearch {
    /// # Arguments
    /// * `gateway` - Gateway to the terminology server
    /// * `kind` - Entity kind served at `path`
    /// * `path` - Collection path relative to the gateway base URL
    pub fn new(gateway: Arc<TerminologyGateway>, kind: EntityKind, path: impl Into<String>) -> Self {
        Self {
            gateway,
            kind,
            path: path.into(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Search URL for a normalised query; unset pagination keys are omitted
    pub fn search_url(&self, normalized: &NormalizedQuery) -> Result<Url> {
        let mut url = self.gateway.url_for(&self.path)?;
        {
            let mut pairs = url.query_pairs_mut();
            if !normalized.query_string.is_empty() {
                pairs.append_pair("query", &normalized.query_string);
            }
            let pagination = &normalized.pagination;
            if let Some(offset) = pagination.offset {
                pairs.append_pair("offset", &offset.to_string());
            }
            if let Some(limit) = pagination.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if let Some(sort_field) = &pagination.sort_field {
                pairs.append_pair("sort", sort_field);
            }
            pairs.append_pair("ascending", if pagination.ascending { "true" } else { "false" });
        }
        Ok(url)
    }

    /// URL of one entity; the id is a single percent-encoded path segment
    pub fn item_url(&self, id: &str) -> Result<Url> {
        let mut url = self.gateway.url_for(&self.path)?;
        let url_str = url.to_string();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidRequest(format!("{} cannot take a path segment", url_str)))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    #[instrument(skip(self, request, language), fields(kind = %self.kind))]
    pub async fn search(&self, request: &SearchRequest, language: Option<&str>) -> Result<ResultList> {
        let normalized = normalize(request, self.kind);
        let url = self.search_url(&normalized)?;
        debug!(query = %normalized.query_string, "Searching terminology server");

        let page: RemotePage = self
            .gateway
            .get(url.as_str(), language)
            .await?
            .error_for_status()?
            .json()?;

        let total_count = page.total_count.unwrap_or(page.items.len() as u64);
        let items = page
            .items
            .into_iter()
            .map(|item| self.record_from(item))
            .collect::<Result<Vec<_>>>()?;

        Ok(ResultList::new(items, total_count))
    }

    /// Fetch one entity; a 404 becomes `Error::NotFound`
    #[instrument(skip(self, language), fields(kind = %self.kind))]
    pub async fn get(&self, id: &str, language: Option<&str>) -> Result<Record> {
        let url = self.item_url(id)?;
        let response = self.gateway.get(url.as_str(), language).await?;

        if response.status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                kind: self.kind,
                id: id.to_string(),
            });
        }

        let item: Value = response.error_for_status()?.json()?;
        self.record_from(item)
    }

    fn record_from(&self, item: Value) -> Result<Record> {
        let id = match item.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(Error::Gateway(format!(
                    "{} returned by the terminology server has no id",
                    self.kind
                )));
            }
        };
        Ok(Record::new(self.kind, id, item))
    }
}
