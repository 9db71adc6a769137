//! Content Store
//!
//! CRUD and query operations over content nodes addressed by `Location`
//! keys. The store resolves keys against a `DocumentStore`, hands raw
//! records to a fresh `CachingDescriptorSystem` per read, and notifies
//! subscribers about every write.
//!
//! # Addressing
//!
//! Point lookups and writes need a fully specified key. Point lookups match
//! `revision` literally, so an unset revision only finds the published
//! record. `get_items` treats unset fields as wildcards.
//!
//! # Side effects
//!
//! Some categories keep other records in sync (a static tab is mirrored in
//! its course's `tabs` setting). Those rules live in `StructureHook`s keyed
//! by category. Hook writes and the triggering write are separate datastore
//! operations; there is no transaction around them.

use crate::behaviors::BehaviorRegistry;
use crate::config::StoreConfig;
use crate::db::{DatabaseError, DocumentStore, RecordUpdate, StoreEvent};
use crate::models::{Location, RawRecord};
use crate::services::caching_system::{CachingDescriptorSystem, Depth, ItemLoader};
use crate::services::content_node::ContentNode;
use crate::services::error::{StoreError, StoreResult};
use crate::services::hooks::HookRegistry;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

const STORE_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Content store over a document datastore
///
/// Cheap to clone; clones share the datastore, registries and event
/// channel.
///
/// # Examples
///
/// ```rust
/// use coursestore_core::config::StoreConfig;
/// use coursestore_core::db::MemoryDocumentStore;
/// use coursestore_core::models::{Location, RawRecord};
/// use coursestore_core::services::{ContentStore, Depth};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = ContentStore::new(Arc::new(MemoryDocumentStore::new()), &StoreConfig::default())?;
///
/// let key = Location::new("orgA", "cs101", "html", "intro")?;
/// store.insert_item(RawRecord::new(key.clone())).await?;
/// store.update_item(&key, json!("<p>Welcome</p>")).await?;
///
/// let node = store.get_item(&key, Depth::Levels(0)).await?;
/// assert_eq!(node.fields().content(), &json!("<p>Welcome</p>"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ContentStore {
    db: Arc<dyn DocumentStore>,

    behaviors: Arc<BehaviorRegistry>,

    hooks: Arc<HookRegistry>,

    /// Broadcast channel for store events
    event_tx: broadcast::Sender<StoreEvent>,
}

impl ContentStore {
    /// Create a store with the built-in behaviors and hooks
    pub fn new(db: Arc<dyn DocumentStore>, config: &StoreConfig) -> StoreResult<Self> {
        let behaviors = BehaviorRegistry::from_config(config)?;
        Ok(Self::with_registries(
            db,
            behaviors,
            HookRegistry::with_builtins(),
        ))
    }

    /// Create a store with caller-provided registries
    pub fn with_registries(
        db: Arc<dyn DocumentStore>,
        behaviors: BehaviorRegistry,
        hooks: HookRegistry,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(STORE_EVENT_CHANNEL_CAPACITY);
        Self {
            db,
            behaviors: Arc::new(behaviors),
            hooks: Arc::new(hooks),
            event_tx,
        }
    }

    pub fn db(&self) -> &Arc<dyn DocumentStore> {
        &self.db
    }

    pub fn behaviors(&self) -> &Arc<BehaviorRegistry> {
        &self.behaviors
    }

    /// Subscribe to item and index events
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores send errors when nobody is subscribed
    pub(crate) fn emit_event(&self, event: StoreEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Node at exactly `location`
    ///
    /// # Errors
    ///
    /// - `InsufficientSpecification` for patterns
    /// - `ItemNotFound` when no record matches, including when only another
    ///   revision of the key exists
    pub async fn get_item(&self, location: &Location, depth: Depth) -> StoreResult<ContentNode> {
        let record = self
            .find_exact(location)
            .await?
            .ok_or_else(|| StoreError::item_not_found(location))?;

        let loader: Arc<dyn ItemLoader> = Arc::new(self.clone());
        let mut nodes = self.load_records(vec![record], depth, loader, false).await?;
        nodes
            .pop()
            .ok_or_else(|| StoreError::item_not_found(location))
    }

    /// Every node matching `pattern`, unset fields matching anything
    ///
    /// All results share one prefetch snapshot.
    pub async fn get_items(&self, pattern: &Location, depth: Depth) -> StoreResult<Vec<ContentNode>> {
        let records = self.db.find(&pattern.as_query_pattern()).await?;
        tracing::debug!("Pattern {} matched {} records", pattern, records.len());

        let loader: Arc<dyn ItemLoader> = Arc::new(self.clone());
        self.load_records(records, depth, loader, false).await
    }

    pub async fn has_item(&self, location: &Location) -> StoreResult<bool> {
        Ok(self.find_exact(location).await?.is_some())
    }

    /// Replace the content payload
    pub async fn update_item(&self, location: &Location, data: Value) -> StoreResult<()> {
        self.update_partition(location, RecordUpdate::Data(data))
            .await
    }

    /// Replace the ordered child list
    pub async fn update_children(
        &self,
        location: &Location,
        children: Vec<Location>,
    ) -> StoreResult<()> {
        self.update_partition(location, RecordUpdate::Children(children))
            .await
    }

    /// Replace the settings, after running the category's hooks
    pub async fn update_metadata(
        &self,
        location: &Location,
        metadata: Map<String, Value>,
    ) -> StoreResult<()> {
        location.ensure_fully_specified()?;
        for hook in self.hooks.for_category(location.category().unwrap_or_default()) {
            hook.on_metadata_update(self, location, &metadata).await?;
        }

        self.update_partition(location, RecordUpdate::Metadata(metadata))
            .await
    }

    /// Copy the record at `source` to `destination`
    ///
    /// # Errors
    ///
    /// - `ItemNotFound` if `source` does not exist
    /// - `DuplicateItem` if `destination` already exists
    pub async fn clone_item(
        &self,
        source: &Location,
        destination: &Location,
    ) -> StoreResult<ContentNode> {
        destination.ensure_fully_specified()?;
        let source_record = self
            .find_exact(source)
            .await?
            .ok_or_else(|| StoreError::item_not_found(source))?;

        let mut record = RawRecord::new(destination.clone());
        record.definition = source_record.definition;
        record.metadata = source_record.metadata;

        let node = self.insert_item(record.clone()).await?;
        for hook in self.hooks.for_category(destination.category().unwrap_or_default()) {
            hook.on_clone(self, destination, &record).await?;
        }

        tracing::debug!("Cloned {} to {}", source, destination);
        Ok(node)
    }

    /// Remove the record at `location`
    ///
    /// Hooks run before the removal. Deleting a missing record does nothing.
    pub async fn delete_item(&self, location: &Location) -> StoreResult<()> {
        location.ensure_fully_specified()?;

        let hooks = self.hooks.for_category(location.category().unwrap_or_default());
        if !hooks.is_empty() && self.has_item(location).await? {
            for hook in hooks {
                hook.on_delete(self, location).await?;
            }
        }

        if self.db.remove(location).await? > 0 {
            self.emit_event(StoreEvent::ItemDeleted {
                location: location.clone(),
            });
        }
        Ok(())
    }

    /// Keys of every record listing `location` as a child
    pub async fn get_parent_locations(&self, location: &Location) -> StoreResult<Vec<Location>> {
        location.ensure_fully_specified()?;
        Ok(self.db.find_parents(location).await?)
    }

    /// The course an item belongs to
    ///
    /// Exactly one `course` record must share the item's org and course.
    pub async fn get_course_for_item(&self, location: &Location) -> StoreResult<ContentNode> {
        location.ensure_fully_specified()?;
        let pattern = Location::pattern(location.org(), location.course(), Some("course"), None)?;
        let mut records = self.db.find(&pattern.as_query_pattern()).await?;

        match records.len() {
            0 => Err(StoreError::CourseNotFound {
                pattern: pattern.to_string(),
            }),
            1 => {
                let loader: Arc<dyn ItemLoader> = Arc::new(self.clone());
                let record = records.remove(0);
                let location = record.location.clone();
                self.load_records(vec![record], Depth::Levels(0), loader, false)
                    .await?
                    .pop()
                    .ok_or_else(|| StoreError::item_not_found(location))
            }
            count => Err(StoreError::AmbiguousCourse {
                pattern: pattern.to_string(),
                count,
            }),
        }
    }

    /// Create a new record
    pub async fn insert_item(&self, record: RawRecord) -> StoreResult<ContentNode> {
        record.location.ensure_fully_specified()?;
        let location = record.location.clone();

        self.db.insert(record).await.map_err(|e| match e {
            DatabaseError::DuplicateKey { key } => StoreError::duplicate_item(key),
            other => other.into(),
        })?;
        self.emit_event(StoreEvent::ItemCreated {
            location: location.clone(),
        });

        self.get_item(&location, Depth::Levels(0)).await
    }

    /// Every course in the store
    pub async fn get_courses(&self, depth: Depth) -> StoreResult<Vec<ContentNode>> {
        let pattern = Location::pattern(None, None, Some("course"), None)?;
        self.get_items(&pattern, depth).await
    }

    /// Persist field writes made on `node`
    pub async fn save(&self, node: &mut ContentNode) -> StoreResult<()> {
        let location = node.location().clone();
        for update in node.fields_mut().take_updates() {
            match update {
                RecordUpdate::Metadata(metadata) => self.update_metadata(&location, metadata).await?,
                other => self.update_partition(&location, other).await?,
            }
        }
        Ok(())
    }

    /// Close the underlying datastore
    pub async fn close(&self) -> StoreResult<()> {
        self.db.close().await?;
        Ok(())
    }

    /// First record at exactly `location`, lowest revision first
    pub(crate) async fn find_exact(&self, location: &Location) -> StoreResult<Option<RawRecord>> {
        location.ensure_fully_specified()?;
        let mut records = self.db.find(&location.as_exact_query()).await?;
        if records.is_empty() {
            Ok(None)
        } else {
            Ok(Some(records.remove(0)))
        }
    }

    /// Prefetch below `records` and turn them into nodes, in input order
    pub(crate) async fn load_records(
        &self,
        records: Vec<RawRecord>,
        depth: Depth,
        loader: Arc<dyn ItemLoader>,
        prefer_drafts: bool,
    ) -> StoreResult<Vec<ContentNode>> {
        let system = CachingDescriptorSystem::prefetch(
            self.db.as_ref(),
            Arc::clone(&self.behaviors),
            loader,
            records.clone(),
            depth,
            prefer_drafts,
        )
        .await?;

        Ok(records
            .into_iter()
            .map(|record| system.instantiate(record))
            .collect())
    }

    /// Single-partition write; zero matches is `ItemNotFound`
    pub(crate) async fn update_partition(
        &self,
        location: &Location,
        update: RecordUpdate,
    ) -> StoreResult<()> {
        location.ensure_fully_specified()?;
        let partition = update.partition();

        if self.db.update(location, update).await? == 0 {
            return Err(StoreError::item_not_found(location));
        }

        tracing::debug!("Updated {} of {}", partition, location);
        self.emit_event(StoreEvent::ItemUpdated {
            location: location.clone(),
            partition: partition.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl ItemLoader for ContentStore {
    async fn load_item(&self, location: &Location) -> StoreResult<ContentNode> {
        self.get_item(location, Depth::Levels(0)).await
    }
}
