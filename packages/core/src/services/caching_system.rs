//! Caching Descriptor System
//!
//! Turns raw records into typed `ContentNode`s for the duration of one read
//! operation. Before any node is built, the subtree below the seed records
//! is prefetched breadth-first up to the requested depth, one batch query
//! per level, so walking children inside that depth never goes back to the
//! datastore.
//!
//! Keys that were not prefetched fall back to the owning store through the
//! `ItemLoader` seam. When nodes are loaded through the draft overlay that
//! loader is the overlay itself, so a miss still prefers the draft.
//!
//! A system is never shared across operations; the snapshot is as old as
//! the read that built it.

use crate::behaviors::{BehaviorRegistry, ContentBehavior, ErrorBehavior};
use crate::db::DocumentStore;
use crate::models::{Location, RawRecord};
use crate::services::content_node::ContentNode;
use crate::services::draft_store::DRAFT;
use crate::services::error::StoreResult;
use crate::services::key_value_store::ScopedKeyValueStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// How far below the seed records to prefetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Prefetch this many levels of children; `Levels(0)` prefetches nothing
    Levels(usize),
    /// Prefetch the whole subtree
    Unbounded,
}

impl Depth {
    /// Whether a prefetch pass for `level` (1-based) is still in budget
    fn allows(&self, level: usize) -> bool {
        match self {
            Depth::Levels(max) => level <= *max,
            Depth::Unbounded => true,
        }
    }
}

/// Direct fetch of a single node, used for cache misses
#[async_trait]
pub trait ItemLoader: Send + Sync {
    async fn load_item(&self, location: &Location) -> StoreResult<ContentNode>;
}

pub struct CachingDescriptorSystem {
    snapshot: HashMap<Location, RawRecord>,
    subtree_edited_on: HashMap<Location, DateTime<Utc>>,
    registry: Arc<BehaviorRegistry>,
    loader: Arc<dyn ItemLoader>,
    prefer_drafts: bool,
}

impl CachingDescriptorSystem {
    /// Build a system over `seeds` and everything reachable within `depth`
    ///
    /// With `prefer_drafts`, each prefetched child key is looked up in both
    /// revisions and the draft wins.
    pub async fn prefetch(
        db: &dyn DocumentStore,
        registry: Arc<BehaviorRegistry>,
        loader: Arc<dyn ItemLoader>,
        seeds: Vec<RawRecord>,
        depth: Depth,
        prefer_drafts: bool,
    ) -> StoreResult<Arc<Self>> {
        let mut snapshot: HashMap<Location, RawRecord> = HashMap::new();
        let mut frontier: Vec<Location> = Vec::new();
        for record in seeds {
            let key = snapshot_key(&record.location, prefer_drafts);
            frontier.push(key.clone());
            snapshot.insert(key, record);
        }

        let mut level = 1;
        while depth.allows(level) && !frontier.is_empty() {
            let mut missing: Vec<Location> = Vec::new();
            let mut seen: HashSet<Location> = HashSet::new();
            for key in &frontier {
                if let Some(record) = snapshot.get(key) {
                    for child in record.children() {
                        let child_key = snapshot_key(child, prefer_drafts);
                        if !snapshot.contains_key(&child_key) && seen.insert(child_key.clone()) {
                            missing.push(child_key);
                        }
                    }
                }
            }
            if missing.is_empty() {
                break;
            }

            let mut query = missing.clone();
            if prefer_drafts {
                query.extend(missing.iter().map(|key| key.draft()));
            }

            tracing::debug!(
                "Prefetch level {}: fetching {} children",
                level,
                missing.len()
            );
            let fetched = db.find_by_locations(&query).await?;

            for record in fetched {
                let key = snapshot_key(&record.location, prefer_drafts);
                let is_draft = record.location.revision() == Some(DRAFT);
                if is_draft || !snapshot.contains_key(&key) {
                    snapshot.insert(key, record);
                }
            }
            frontier = missing
                .into_iter()
                .filter(|key| snapshot.contains_key(key))
                .collect();
            level += 1;
        }

        let subtree_edited_on = subtree_edit_times(&snapshot, prefer_drafts);
        tracing::debug!("Snapshot ready with {} records", snapshot.len());

        Ok(Arc::new(Self {
            snapshot,
            subtree_edited_on,
            registry,
            loader,
            prefer_drafts,
        }))
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.snapshot
            .contains_key(&snapshot_key(location, self.prefer_drafts))
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Latest edit time of `location` and its prefetched descendants
    pub fn subtree_edited_on(&self, location: &Location) -> Option<DateTime<Utc>> {
        self.subtree_edited_on
            .get(&snapshot_key(location, self.prefer_drafts))
            .copied()
    }

    /// Typed node for `location`, from the snapshot or through the loader
    pub async fn load_item(self: &Arc<Self>, location: &Location) -> StoreResult<ContentNode> {
        match self
            .snapshot
            .get(&snapshot_key(location, self.prefer_drafts))
        {
            Some(record) => Ok(self.instantiate(record.clone())),
            None => {
                tracing::debug!("Cache miss for {}, loading directly", location);
                self.loader.load_item(location).await
            }
        }
    }

    /// Typed node over `record`
    ///
    /// Never fails: a category without a behavior, or fields the behavior
    /// rejects, yield an error node that keeps the original record.
    pub fn instantiate(self: &Arc<Self>, record: RawRecord) -> ContentNode {
        let fields = ScopedKeyValueStore::new(
            record.definition.data.clone(),
            record.definition.children.clone(),
            record.metadata.clone(),
        );
        let category = record.category().unwrap_or_default();

        let resolved = self.registry.resolve(category).and_then(|behavior| {
            behavior.validate(&fields)?;
            Ok(behavior)
        });

        match resolved {
            Ok(behavior) => ContentNode::new(record, behavior, fields, Arc::clone(self), None),
            Err(e) => {
                tracing::warn!("Failed to load {}: {}", record.location, e);
                let behavior: Arc<dyn ContentBehavior> = Arc::new(ErrorBehavior);
                ContentNode::new(record, behavior, fields, Arc::clone(self), Some(e.to_string()))
            }
        }
    }
}

fn snapshot_key(location: &Location, prefer_drafts: bool) -> Location {
    if prefer_drafts {
        location.published()
    } else {
        location.clone()
    }
}

fn subtree_edit_times(
    snapshot: &HashMap<Location, RawRecord>,
    prefer_drafts: bool,
) -> HashMap<Location, DateTime<Utc>> {
    fn visit(
        key: &Location,
        snapshot: &HashMap<Location, RawRecord>,
        prefer_drafts: bool,
        memo: &mut HashMap<Location, Option<DateTime<Utc>>>,
        visiting: &mut HashSet<Location>,
    ) -> Option<DateTime<Utc>> {
        if let Some(known) = memo.get(key) {
            return *known;
        }
        let record = snapshot.get(key)?;
        // Cyclic children lists contribute nothing past the first visit
        if !visiting.insert(key.clone()) {
            return None;
        }

        let mut latest = record.edit_info.edited_on;
        for child in record.children() {
            let child_key = snapshot_key(child, prefer_drafts);
            let child_latest = visit(&child_key, snapshot, prefer_drafts, memo, visiting);
            latest = latest.max(child_latest);
        }

        visiting.remove(key);
        memo.insert(key.clone(), latest);
        latest
    }

    let mut memo = HashMap::new();
    let mut visiting = HashSet::new();
    for key in snapshot.keys() {
        visit(key, snapshot, prefer_drafts, &mut memo, &mut visiting);
    }

    memo.into_iter()
        .filter_map(|(key, latest)| latest.map(|dt| (key, dt)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDocumentStore;
    use crate::services::error::StoreError;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ItemLoader for CountingLoader {
        async fn load_item(&self, location: &Location) -> StoreResult<ContentNode> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::item_not_found(location))
        }
    }

    fn key(category: &str, name: &str) -> Location {
        Location::new("orgA", "cs101", category, name).unwrap()
    }

    /// course -> chapter -> sequential -> html
    async fn seeded_chain(db: &MemoryDocumentStore) -> RawRecord {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let records = vec![
            RawRecord::new(key("chapter", "ch1"))
                .with_children(vec![key("sequential", "s1")])
                .edited_at(early),
            RawRecord::new(key("sequential", "s1"))
                .with_children(vec![key("html", "h1")])
                .edited_at(early),
            RawRecord::new(key("html", "h1"))
                .with_data(serde_json::json!("<p>hi</p>"))
                .edited_at(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
        ];
        for record in records {
            db.insert(record).await.unwrap();
        }
        let course = RawRecord::new(key("course", "2024"))
            .with_children(vec![key("chapter", "ch1")])
            .edited_at(early);
        db.insert(course.clone()).await.unwrap();
        course
    }

    async fn build(
        db: &MemoryDocumentStore,
        seed: RawRecord,
        depth: Depth,
    ) -> (Arc<CachingDescriptorSystem>, Arc<CountingLoader>) {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        });
        let system = CachingDescriptorSystem::prefetch(
            db,
            Arc::new(BehaviorRegistry::with_builtins()),
            loader.clone(),
            vec![seed],
            depth,
            false,
        )
        .await
        .unwrap();
        (system, loader)
    }

    #[tokio::test]
    async fn test_depth_zero_issues_no_child_query() {
        let db = MemoryDocumentStore::new();
        let course = seeded_chain(&db).await;
        db.reset_read_count();

        let (system, _) = build(&db, course, Depth::Levels(0)).await;
        assert_eq!(db.read_count(), 0);
        assert_eq!(system.len(), 1);
    }

    #[tokio::test]
    async fn test_one_batch_query_per_level() {
        let db = MemoryDocumentStore::new();
        let course = seeded_chain(&db).await;
        db.reset_read_count();

        let (system, _) = build(&db, course, Depth::Levels(2)).await;
        assert_eq!(db.read_count(), 2);
        assert!(system.contains(&key("sequential", "s1")));
        assert!(!system.contains(&key("html", "h1")));
    }

    #[tokio::test]
    async fn test_unbounded_prefetch_needs_no_fallback() {
        let db = MemoryDocumentStore::new();
        let course = seeded_chain(&db).await;

        let (system, loader) = build(&db, course, Depth::Unbounded).await;
        let mut node = system.load_item(&key("course", "2024")).await.unwrap();
        while node.has_children() {
            let mut children = node.children().await.unwrap();
            node = children.remove(0);
        }

        assert_eq!(node.category(), "html");
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_miss_goes_through_loader() {
        let db = MemoryDocumentStore::new();
        let course = seeded_chain(&db).await;

        let (system, loader) = build(&db, course, Depth::Levels(0)).await;
        let result = system.load_item(&key("chapter", "ch1")).await;

        assert!(matches!(result, Err(StoreError::ItemNotFound { .. })));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subtree_edit_time_covers_descendants() {
        let db = MemoryDocumentStore::new();
        let course = seeded_chain(&db).await;

        let (system, _) = build(&db, course, Depth::Unbounded).await;
        let leaf_edit = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        assert_eq!(system.subtree_edited_on(&key("course", "2024")), Some(leaf_edit));
        assert_eq!(system.subtree_edited_on(&key("chapter", "ch1")), Some(leaf_edit));
    }

    #[tokio::test]
    async fn test_unknown_category_becomes_error_node() {
        let db = MemoryDocumentStore::new();
        let record = RawRecord::new(key("poll", "p1"));

        let (system, _) = build(&db, record.clone(), Depth::Levels(0)).await;
        let node = system.instantiate(record);

        assert!(node.is_error());
        assert!(node.error_message().unwrap().contains("poll"));
        assert!(!node.has_children());
        assert!(node.index_payload().is_none());
    }
}
