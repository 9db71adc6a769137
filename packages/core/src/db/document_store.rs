//! DocumentStore Trait - Datastore Abstraction Layer
//!
//! The content store only relies on a small key-based contract from the
//! underlying document datastore:
//!
//! - point and pattern lookup, sorted by revision so "latest" is defined
//! - batch lookup of a set of keys (one round trip per prefetch level)
//! - reverse lookup of records that list a key among their children
//! - insert, single-record partial update, delete
//!
//! Each single-record write is assumed atomic. Sequences of writes are not.
//!
//! # Examples
//!
//! ```rust
//! use coursestore_core::db::{DocumentStore, MemoryDocumentStore};
//! use coursestore_core::models::{Location, RawRecord};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = MemoryDocumentStore::new();
//! let key = Location::new("orgA", "cs101", "html", "intro")?;
//! db.insert(RawRecord::new(key.clone())).await?;
//!
//! let found = db.find(&key.as_exact_query()).await?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::db::DatabaseError;
use crate::models::{Location, LocationQuery, RawRecord};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A "set these fields" update applied to exactly one record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordUpdate {
    /// Replace `definition.data`
    Data(Value),
    /// Replace `definition.children`
    Children(Vec<Location>),
    /// Replace `metadata`
    Metadata(Map<String, Value>),
}

impl RecordUpdate {
    /// Partition name, used in logs and events
    pub fn partition(&self) -> &'static str {
        match self {
            RecordUpdate::Data(_) => "data",
            RecordUpdate::Children(_) => "children",
            RecordUpdate::Metadata(_) => "metadata",
        }
    }

    /// Apply the update to an in-memory record
    pub fn apply(self, record: &mut RawRecord) {
        match self {
            RecordUpdate::Data(data) => record.definition.data = data,
            RecordUpdate::Children(children) => record.definition.children = children,
            RecordUpdate::Metadata(metadata) => record.metadata = metadata,
        }
    }
}

/// Abstraction over the document datastore holding raw node records
///
/// Implementations must be `Send + Sync`; one store is shared by every
/// operation of a process.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Records matching `query`, sorted by ascending revision
    ///
    /// Unset revisions sort before any set revision.
    async fn find(&self, query: &LocationQuery) -> Result<Vec<RawRecord>, DatabaseError>;

    /// Records whose key is exactly one of `locations`, in one round trip
    ///
    /// Missing keys are skipped; order is unspecified.
    async fn find_by_locations(
        &self,
        locations: &[Location],
    ) -> Result<Vec<RawRecord>, DatabaseError>;

    /// Keys of every record whose children list contains `child`
    async fn find_parents(&self, child: &Location) -> Result<Vec<Location>, DatabaseError>;

    /// Insert a new record, stamping `edit_info.edited_on` when unset
    ///
    /// # Errors
    ///
    /// `DatabaseError::DuplicateKey` if a record with the same key exists.
    async fn insert(&self, record: RawRecord) -> Result<(), DatabaseError>;

    /// Apply `update` to the record at `location` and stamp `edited_on`
    ///
    /// Returns the number of records matched (0 or 1). No upsert.
    async fn update(&self, location: &Location, update: RecordUpdate)
        -> Result<u64, DatabaseError>;

    /// Delete the record at `location`, returning how many were removed
    async fn remove(&self, location: &Location) -> Result<u64, DatabaseError>;

    /// Flush and release resources
    async fn close(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Sort records the way `DocumentStore::find` promises
pub(crate) fn sort_by_revision(records: &mut [RawRecord]) {
    records.sort_by(|a, b| a.location.revision().cmp(&b.location.revision()));
}
