//! Content Services
//!
//! This module contains the content store and everything built on top of it:
//!
//! - `ContentStore` - CRUD and query operations over location keys
//! - `CachingDescriptorSystem` - Per-read prefetch snapshot and node factory
//! - `ScopedKeyValueStore` - Scope-routed field access for one node
//! - `DraftStore` - Draft/published overlay over a `ContentStore`
//! - `SearchIndexer` - Incremental search indexing of course subtrees
//!
//! Services coordinate between the database layer and callers; the
//! datastore itself is only reached through `db::DocumentStore`.

pub mod caching_system;
pub mod content_node;
pub mod content_store;
pub mod draft_store;
pub mod error;
pub mod hooks;
pub mod indexer;
pub mod key_value_store;
pub mod search_engine;

pub use caching_system::{CachingDescriptorSystem, Depth, ItemLoader};
pub use content_node::ContentNode;
pub use content_store::ContentStore;
pub use draft_store::{DraftStore, DIRECT_ONLY_CATEGORIES, DRAFT};
pub use error::{SearchIndexingError, StoreError, StoreResult};
pub use hooks::{HookRegistry, StaticTabHook, StructureHook};
pub use indexer::{CoursewareIndex, IndexDefinition, LibraryIndex, SearchIndexer};
pub use key_value_store::ScopedKeyValueStore;
pub use search_engine::{InMemorySearchEngine, SearchEngine, SearchError, SearchResponse, SearchResult};
