//! Incremental Search Indexer
//!
//! Walks the published subtree below a course (or library) root and pushes
//! one search document per indexable node, then removes documents for
//! nodes that are no longer reachable.
//!
//! # Incremental passes
//!
//! A pass triggered by an edit carries the time of that edit. Subtrees whose
//! latest edit is older than the trigger by more than the reindex age are
//! still walked, so their ids stay reachable, but their documents are not
//! resubmitted. A full reindex passes no trigger time.
//!
//! # Failures
//!
//! A document the engine rejects is logged and recorded, and the pass goes
//! on. Anything else that goes wrong aborts the walk and adds one generic
//! entry after the per-document ones. Either way the caller gets a single
//! `SearchIndexingError` listing every message.

use crate::config::IndexerConfig;
use crate::db::StoreEvent;
use crate::models::Location;
use crate::services::caching_system::Depth;
use crate::services::content_node::ContentNode;
use crate::services::content_store::ContentStore;
use crate::services::error::{SearchIndexingError, StoreError, StoreResult};
use crate::services::search_engine::SearchEngine;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// What a particular search index looks like
pub trait IndexDefinition: Send + Sync {
    fn index_name(&self) -> &'static str;

    fn document_type(&self) -> &'static str;

    /// Name of the event emitted after a full reindex
    fn event_name(&self) -> &'static str;

    /// Category of the event emitted after a full reindex
    fn event_category(&self) -> &'static str;

    fn is_enabled(&self, config: &IndexerConfig) -> bool;

    /// Fields shared by every document of one root, also used to find them
    fn location_info(&self, root: &Location) -> Map<String, Value>;

    fn document_id(&self, location: &Location) -> String;
}

/// Course content index
#[derive(Debug, Clone, Copy, Default)]
pub struct CoursewareIndex;

impl IndexDefinition for CoursewareIndex {
    fn index_name(&self) -> &'static str {
        "courseware_index"
    }

    fn document_type(&self) -> &'static str {
        "courseware_content"
    }

    fn event_name(&self) -> &'static str {
        "edx.course.index.reindexed"
    }

    fn event_category(&self) -> &'static str {
        "courseware_index"
    }

    fn is_enabled(&self, config: &IndexerConfig) -> bool {
        config.courseware_enabled
    }

    fn location_info(&self, root: &Location) -> Map<String, Value> {
        let mut info = Map::new();
        info.insert(
            "course".to_string(),
            json!(root.course_id().unwrap_or_else(|| root.to_string())),
        );
        info
    }

    fn document_id(&self, location: &Location) -> String {
        location.to_string()
    }
}

/// Content library index
///
/// Document ids drop the revision so every version of a library block maps
/// to the same document.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibraryIndex;

impl IndexDefinition for LibraryIndex {
    fn index_name(&self) -> &'static str {
        "library_index"
    }

    fn document_type(&self) -> &'static str {
        "library_content"
    }

    fn event_name(&self) -> &'static str {
        "edx.library.index.reindexed"
    }

    fn event_category(&self) -> &'static str {
        "library_index"
    }

    fn is_enabled(&self, config: &IndexerConfig) -> bool {
        config.library_enabled
    }

    fn location_info(&self, root: &Location) -> Map<String, Value> {
        let mut info = Map::new();
        info.insert(
            "library".to_string(),
            json!(root.course_id().unwrap_or_else(|| root.to_string())),
        );
        info
    }

    fn document_id(&self, location: &Location) -> String {
        location.published().to_string()
    }
}

/// Bookkeeping for one indexing pass
#[derive(Debug, Default)]
struct IndexPass {
    reachable: HashSet<String>,
    errors: Vec<String>,
    indexed_count: usize,
}

/// Keeps a search index in step with one content store
pub struct SearchIndexer<D: IndexDefinition> {
    store: ContentStore,
    engine: Option<Arc<dyn SearchEngine>>,
    definition: D,
    config: IndexerConfig,
}

impl<D: IndexDefinition> SearchIndexer<D> {
    /// `engine: None` turns every pass into a no-op
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidConfig` if `config` fails validation.
    pub fn new(
        store: ContentStore,
        engine: Option<Arc<dyn SearchEngine>>,
        definition: D,
        config: IndexerConfig,
    ) -> StoreResult<Self> {
        config.validate().map_err(StoreError::invalid_config)?;

        Ok(Self {
            store,
            engine,
            definition,
            config,
        })
    }

    pub fn definition(&self) -> &D {
        &self.definition
    }

    /// Index the subtree below `root`
    ///
    /// Returns the number of submitted documents, or `None` when indexing is
    /// disabled or no engine is configured.
    pub async fn index(
        &self,
        root: &Location,
        triggered_at: Option<DateTime<Utc>>,
    ) -> Result<Option<usize>, SearchIndexingError> {
        let Some(engine) = self.engine.as_deref() else {
            return Ok(None);
        };
        if !self.definition.is_enabled(&self.config) {
            return Ok(None);
        }

        let location_info = self.definition.location_info(root);
        let mut pass = IndexPass::default();

        if let Err(e) = self
            .index_root(engine, root, triggered_at, &location_info, &mut pass)
            .await
        {
            tracing::error!(
                "Indexing error encountered, {} may be out of date: {:#}",
                root,
                e
            );
            pass.errors.push("General indexing error occurred".to_string());
        }

        if !pass.errors.is_empty() {
            return Err(SearchIndexingError::new(
                "Error(s) present during indexing",
                pass.errors,
                pass.indexed_count,
            ));
        }

        tracing::debug!(
            "Indexed {} documents below {} into {}",
            pass.indexed_count,
            root,
            self.definition.index_name()
        );
        Ok(Some(pass.indexed_count))
    }

    /// Full reindex of `root`, announced through the store's events
    pub async fn do_reindex(&self, root: &Location) -> Result<Option<usize>, SearchIndexingError> {
        let indexed = self.index(root, None).await?;

        if let Some(indexed_count) = indexed.filter(|count| *count > 0) {
            tracing::info!(
                "Reindexed {} documents for {} ({})",
                indexed_count,
                root,
                self.definition.index_name()
            );
            self.store.emit_event(StoreEvent::IndexRebuilt {
                name: self.definition.event_name().to_string(),
                category: self.definition.event_category().to_string(),
                indexed_count,
            });
        }
        Ok(indexed)
    }

    async fn index_root(
        &self,
        engine: &dyn SearchEngine,
        root: &Location,
        triggered_at: Option<DateTime<Utc>>,
        location_info: &Map<String, Value>,
        pass: &mut IndexPass,
    ) -> anyhow::Result<()> {
        let structure = self.store.get_item(root, Depth::Unbounded).await?;
        for child in structure.children().await? {
            self.index_node(engine, child, false, triggered_at, location_info, pass)
                .await?;
        }

        self.remove_deleted_items(engine, location_info, &pass.reachable)
            .await
    }

    fn index_node<'a>(
        &'a self,
        engine: &'a dyn SearchEngine,
        node: ContentNode,
        skip: bool,
        triggered_at: Option<DateTime<Utc>>,
        location_info: &'a Map<String, Value>,
        pass: &'a mut IndexPass,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let payload = node.index_payload();
            if payload.is_none() && !node.has_children() {
                return Ok(());
            }

            let document_id = self.definition.document_id(node.location());
            pass.reachable.insert(document_id.clone());

            if node.has_children() {
                let skip_children = skip || self.is_stale(&node, triggered_at);
                for child in node.children().await? {
                    self.index_node(engine, child, skip_children, triggered_at, location_info, pass)
                        .await?;
                }
            }

            let Some(payload) = payload else {
                return Ok(());
            };
            if skip {
                return Ok(());
            }

            let mut document = location_info.clone();
            document.extend(payload);
            document.insert("id".to_string(), json!(document_id));
            if let Some(start) = node.start() {
                document.insert("start_date".to_string(), json!(start.to_rfc3339()));
            }

            match engine
                .index(self.definition.document_type(), Value::Object(document))
                .await
            {
                Ok(()) => pass.indexed_count += 1,
                Err(e) => {
                    tracing::warn!("Could not index item {}: {}", node.location(), e);
                    pass.errors
                        .push(format!("Could not index item: {}", node.location()));
                }
            }
            Ok(())
        })
    }

    /// Whether nothing below `node` changed within the reindex age of the trigger
    fn is_stale(&self, node: &ContentNode, triggered_at: Option<DateTime<Utc>>) -> bool {
        let (Some(triggered_at), Some(edited_on)) = (triggered_at, node.subtree_edited_on()) else {
            return false;
        };
        (triggered_at - edited_on)
            .to_std()
            .map(|elapsed: Duration| elapsed > self.config.reindex_age())
            .unwrap_or(false)
    }

    /// Drop documents of this root whose ids were not reached
    async fn remove_deleted_items(
        &self,
        engine: &dyn SearchEngine,
        location_info: &Map<String, Value>,
        reachable: &HashSet<String>,
    ) -> anyhow::Result<()> {
        let doc_type = self.definition.document_type();
        let response = engine.search(doc_type, location_info, reachable).await?;

        for id in response.ids() {
            tracing::debug!("Removing unreachable document {}", id);
            engine.remove(doc_type, id).await?;
        }
        Ok(())
    }
}
