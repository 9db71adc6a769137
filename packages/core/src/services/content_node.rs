//! Typed content node
//!
//! A `ContentNode` is the in-memory view of one raw record: its fields
//! behind a `ScopedKeyValueStore`, the behavior registered for its category,
//! and the caching system that built it. Nodes are request-scoped and never
//! persisted directly; writes go back through the content store.

use crate::behaviors::ContentBehavior;
use crate::models::{Location, RawRecord};
use crate::services::caching_system::CachingDescriptorSystem;
use crate::services::draft_store::DRAFT;
use crate::services::error::StoreResult;
use crate::services::key_value_store::ScopedKeyValueStore;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct ContentNode {
    location: Location,
    behavior: Arc<dyn ContentBehavior>,
    fields: ScopedKeyValueStore,
    record: RawRecord,
    system: Arc<CachingDescriptorSystem>,
    load_error: Option<String>,
}

impl ContentNode {
    pub(crate) fn new(
        record: RawRecord,
        behavior: Arc<dyn ContentBehavior>,
        fields: ScopedKeyValueStore,
        system: Arc<CachingDescriptorSystem>,
        load_error: Option<String>,
    ) -> Self {
        Self {
            location: record.location.clone(),
            behavior,
            fields,
            record,
            system,
            load_error,
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn category(&self) -> &str {
        self.location.category().unwrap_or_default()
    }

    /// `display_name` setting, falling back to the key name
    pub fn display_name(&self) -> &str {
        self.fields
            .display_name()
            .or_else(|| self.location.name())
            .unwrap_or_default()
    }

    pub fn fields(&self) -> &ScopedKeyValueStore {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut ScopedKeyValueStore {
        &mut self.fields
    }

    pub fn behavior(&self) -> &Arc<dyn ContentBehavior> {
        &self.behavior
    }

    pub fn has_children(&self) -> bool {
        !self.is_error() && self.behavior.has_children()
    }

    /// Child keys in order; error nodes have none
    pub fn child_locations(&self) -> &[Location] {
        if self.is_error() {
            &[]
        } else {
            self.fields.children()
        }
    }

    /// Typed children, served from the snapshot when prefetched
    pub async fn children(&self) -> StoreResult<Vec<ContentNode>> {
        let mut children = Vec::with_capacity(self.child_locations().len());
        for child in self.child_locations() {
            children.push(self.system.load_item(child).await?);
        }
        Ok(children)
    }

    /// Search document body, `None` for error nodes and non-indexable categories
    pub fn index_payload(&self) -> Option<Map<String, Value>> {
        if self.is_error() {
            return None;
        }
        self.behavior.index_payload(&self.fields)
    }

    /// Release date from the `start` setting
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.fields
            .metadata()
            .get("start")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn edited_on(&self) -> Option<DateTime<Utc>> {
        self.record.edit_info.edited_on
    }

    /// Latest edit of this node or anything prefetched below it
    pub fn subtree_edited_on(&self) -> Option<DateTime<Utc>> {
        self.system
            .subtree_edited_on(&self.location)
            .or(self.record.edit_info.edited_on)
    }

    pub fn is_draft(&self) -> bool {
        self.location.revision() == Some(DRAFT)
    }

    pub fn is_error(&self) -> bool {
        self.load_error.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Record as it was loaded, before any field writes
    pub fn raw_record(&self) -> &RawRecord {
        &self.record
    }

    /// `tabs` setting of a course node
    pub fn tabs(&self) -> Vec<Value> {
        self.fields
            .metadata()
            .get("tabs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

impl fmt::Debug for ContentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentNode")
            .field("location", &self.location)
            .field("behavior", &self.behavior.category())
            .field("load_error", &self.load_error)
            .finish()
    }
}
