//! Search engine boundary
//!
//! The indexer only needs three operations from a search backend: submit a
//! document, find documents by exact field values (minus a set of ids), and
//! remove a document by id. Documents are JSON objects with a string `id`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Document has no string 'id' field")]
    MissingId,

    #[error("Search backend failed: {0}")]
    Backend(String),
}

impl SearchError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

impl SearchResponse {
    /// `id` of every result that has one
    pub fn ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter_map(|result| result.data.get("id").and_then(Value::as_str))
            .collect()
    }
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Add or replace a document
    async fn index(&self, doc_type: &str, document: Value) -> Result<(), SearchError>;

    /// Documents whose fields equal every entry of `field_filter`, skipping
    /// ids in `exclude_ids`
    async fn search(
        &self,
        doc_type: &str,
        field_filter: &Map<String, Value>,
        exclude_ids: &HashSet<String>,
    ) -> Result<SearchResponse, SearchError>;

    async fn remove(&self, doc_type: &str, id: &str) -> Result<(), SearchError>;
}

/// Process-local search engine
#[derive(Debug, Default)]
pub struct InMemorySearchEngine {
    documents: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl InMemorySearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all documents of `doc_type`, ordered by id
    pub async fn documents(&self, doc_type: &str) -> Vec<Value> {
        self.documents
            .read()
            .await
            .get(doc_type)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SearchEngine for InMemorySearchEngine {
    async fn index(&self, doc_type: &str, document: Value) -> Result<(), SearchError> {
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .ok_or(SearchError::MissingId)?
            .to_string();

        self.documents
            .write()
            .await
            .entry(doc_type.to_string())
            .or_default()
            .insert(id, document);
        Ok(())
    }

    async fn search(
        &self,
        doc_type: &str,
        field_filter: &Map<String, Value>,
        exclude_ids: &HashSet<String>,
    ) -> Result<SearchResponse, SearchError> {
        let documents = self.documents.read().await;
        let results = documents
            .get(doc_type)
            .into_iter()
            .flat_map(|docs| docs.iter())
            .filter(|(id, _)| !exclude_ids.contains(*id))
            .filter(|(_, doc)| {
                field_filter
                    .iter()
                    .all(|(field, expected)| doc.get(field) == Some(expected))
            })
            .map(|(_, doc)| SearchResult { data: doc.clone() })
            .collect();

        Ok(SearchResponse { results })
    }

    async fn remove(&self, doc_type: &str, id: &str) -> Result<(), SearchError> {
        if let Some(docs) = self.documents.write().await.get_mut(doc_type) {
            docs.remove(id);
        }
        Ok(())
    }
}
