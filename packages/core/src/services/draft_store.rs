//! Draft Overlay
//!
//! Stages edits in a parallel `@draft` revision of each record. Reads prefer
//! the draft and fall back to the published record; writes always land on
//! the draft, creating it from the published record on first write.
//! `publish` folds the draft back into the published record.
//!
//! Course-level structure (course, chapter, sequential) and course pages
//! are never drafted. Keys of those categories always resolve to the
//! unversioned record, and writes to them go straight through.

use crate::db::{DocumentStore, RecordUpdate};
use crate::models::{Location, RawRecord, DRAFT_REVISION};
use crate::services::caching_system::{Depth, ItemLoader};
use crate::services::content_node::ContentNode;
use crate::services::content_store::ContentStore;
use crate::services::error::{StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Revision of a draft record
pub const DRAFT: &str = DRAFT_REVISION;

/// Categories that are always read and written unversioned
pub const DIRECT_ONLY_CATEGORIES: [&str; 6] = [
    "course",
    "chapter",
    "sequential",
    "about",
    "static_tab",
    "course_info",
];

fn is_direct_only(location: &Location) -> bool {
    location
        .category()
        .is_some_and(|category| DIRECT_ONLY_CATEGORIES.contains(&category))
}

fn as_draft(location: &Location) -> Location {
    if is_direct_only(location) {
        location.published()
    } else {
        location.draft()
    }
}

/// Draft-aware view of a `ContentStore`
#[derive(Clone)]
pub struct DraftStore {
    store: ContentStore,
}

impl DraftStore {
    pub fn new(store: ContentStore) -> Self {
        Self { store }
    }

    /// The published store underneath
    pub fn inner(&self) -> &ContentStore {
        &self.store
    }

    fn db(&self) -> &Arc<dyn DocumentStore> {
        self.store.db()
    }

    fn loader(&self) -> Arc<dyn ItemLoader> {
        Arc::new(self.clone())
    }

    /// Draft record for `location` if one exists, else the published one
    async fn find_preferred(&self, location: &Location) -> StoreResult<Option<RawRecord>> {
        let published = location.published();
        if !is_direct_only(location) {
            if let Some(draft) = self.store.find_exact(&as_draft(&published)).await? {
                return Ok(Some(draft));
            }
        }
        self.store.find_exact(&published).await
    }

    /// Draft node if one exists, else the published node
    ///
    /// Children are prefetched with the same draft preference.
    pub async fn get_item(&self, location: &Location, depth: Depth) -> StoreResult<ContentNode> {
        let record = self
            .find_preferred(location)
            .await?
            .ok_or_else(|| StoreError::item_not_found(location))?;

        let mut nodes = self
            .store
            .load_records(vec![record], depth, self.loader(), true)
            .await?;
        nodes
            .pop()
            .ok_or_else(|| StoreError::item_not_found(location))
    }

    /// Drafts matching `pattern`, plus published matches without a draft
    pub async fn get_items(&self, pattern: &Location, depth: Depth) -> StoreResult<Vec<ContentNode>> {
        let drafts = self
            .db()
            .find(&pattern.draft().as_query_pattern())
            .await?;
        let drafted: HashSet<Location> = drafts.iter().map(|r| r.location.published()).collect();

        let published = self
            .db()
            .find(&pattern.as_published_pattern())
            .await?;

        let mut records = drafts;
        records.extend(
            published
                .into_iter()
                .filter(|r| !drafted.contains(&r.location)),
        );

        self.store
            .load_records(records, depth, self.loader(), true)
            .await
    }

    pub async fn has_item(&self, location: &Location) -> StoreResult<bool> {
        location.ensure_fully_specified()?;
        Ok(self.find_preferred(location).await?.is_some())
    }

    pub async fn get_parent_locations(&self, location: &Location) -> StoreResult<Vec<Location>> {
        self.store.get_parent_locations(&location.published()).await
    }

    pub async fn get_course_for_item(&self, location: &Location) -> StoreResult<ContentNode> {
        self.store.get_course_for_item(location).await
    }

    /// Make sure a draft exists for `location`, returning its key
    async fn ensure_draft(&self, location: &Location) -> StoreResult<Location> {
        location.ensure_fully_specified()?;
        let draft = as_draft(location);
        if is_direct_only(location) || self.store.find_exact(&draft).await?.is_some() {
            return Ok(draft);
        }

        self.convert_to_draft(location).await?;
        Ok(draft)
    }

    /// Write the content payload of the draft
    pub async fn update_item(&self, location: &Location, data: Value) -> StoreResult<()> {
        let draft = self.ensure_draft(location).await?;
        self.store.update_item(&draft, data).await
    }

    /// Write the child list of the draft
    pub async fn update_children(
        &self,
        location: &Location,
        children: Vec<Location>,
    ) -> StoreResult<()> {
        let draft = self.ensure_draft(location).await?;
        self.store.update_children(&draft, children).await
    }

    /// Write the settings of the draft
    pub async fn update_metadata(
        &self,
        location: &Location,
        metadata: Map<String, Value>,
    ) -> StoreResult<()> {
        let draft = self.ensure_draft(location).await?;
        self.store.update_metadata(&draft, metadata).await
    }

    /// Clone the current version of `source` into a new draft at `destination`
    pub async fn clone_item(
        &self,
        source: &Location,
        destination: &Location,
    ) -> StoreResult<ContentNode> {
        destination.ensure_fully_specified()?;
        if self.has_item(destination).await? {
            return Err(StoreError::duplicate_item(destination));
        }

        let source_record = self
            .find_preferred(source)
            .await?
            .ok_or_else(|| StoreError::item_not_found(source))?;

        self.store
            .clone_item(&source_record.location, &as_draft(destination))
            .await
    }

    /// Discard the draft of `location`
    ///
    /// Unversioned categories have no draft, so their record is removed.
    pub async fn delete_item(&self, location: &Location) -> StoreResult<()> {
        location.ensure_fully_specified()?;
        self.store.delete_item(&as_draft(location)).await
    }

    /// Copy the draft onto the published record and drop the draft
    ///
    /// Creates the published record when the item has only ever been a
    /// draft. Publishing an item without a draft is a no-op.
    pub async fn publish(&self, location: &Location) -> StoreResult<()> {
        location.ensure_fully_specified()?;
        if is_direct_only(location) {
            return Ok(());
        }

        let published = location.published();
        let draft_key = as_draft(&published);
        let Some(draft) = self.store.find_exact(&draft_key).await? else {
            tracing::debug!("Nothing to publish for {}", published);
            return Ok(());
        };

        if self.store.has_item(&published).await? {
            self.store
                .update_item(&published, draft.definition.data)
                .await?;
            self.store
                .update_children(&published, draft.definition.children)
                .await?;
            self.store
                .update_metadata(&published, draft.metadata)
                .await?;
        } else {
            let mut record = RawRecord::new(published.clone());
            record.definition = draft.definition;
            record.metadata = draft.metadata;
            self.store.insert_item(record).await?;
        }

        self.store.delete_item(&draft_key).await?;
        tracing::info!("Published {}", published);
        Ok(())
    }

    /// Start a draft from the published record
    ///
    /// # Errors
    ///
    /// - `ItemNotFound` if there is no published record
    /// - `DuplicateItem` if a draft already exists
    pub async fn convert_to_draft(&self, location: &Location) -> StoreResult<ContentNode> {
        location.ensure_fully_specified()?;
        let published = location.published();
        if is_direct_only(&published) {
            return self.store.get_item(&published, Depth::Levels(0)).await;
        }

        self.store.clone_item(&published, &as_draft(&published)).await
    }

    /// Persist field writes made on a node loaded through the overlay
    pub async fn save(&self, node: &mut ContentNode) -> StoreResult<()> {
        let location = node.location().clone();
        for update in node.fields_mut().take_updates() {
            match update {
                RecordUpdate::Data(data) => self.update_item(&location, data).await?,
                RecordUpdate::Children(children) => {
                    self.update_children(&location, children).await?
                }
                RecordUpdate::Metadata(metadata) => {
                    self.update_metadata(&location, metadata).await?
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ItemLoader for DraftStore {
    async fn load_item(&self, location: &Location) -> StoreResult<ContentNode> {
        self.get_item(location, Depth::Levels(0)).await
    }
}
