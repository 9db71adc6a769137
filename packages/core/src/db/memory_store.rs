//! In-memory `DocumentStore`
//!
//! Keeps records in a `HashMap` behind a tokio `RwLock`. Used by tests,
//! benchmarks and short-lived tooling. Counts round trips so callers can
//! verify how many queries a load issued.

use crate::db::document_store::{sort_by_revision, DocumentStore, RecordUpdate};
use crate::db::DatabaseError;
use crate::models::{Location, LocationQuery, RawRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    records: RwLock<HashMap<Location, RawRecord>>,
    read_count: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read round trips served so far
    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::Relaxed)
    }

    pub fn reset_read_count(&self) {
        self.read_count.store(0, Ordering::Relaxed);
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn count_read(&self) {
        self.read_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find(&self, query: &LocationQuery) -> Result<Vec<RawRecord>, DatabaseError> {
        self.count_read();
        let records = self.records.read().await;
        let mut found: Vec<RawRecord> = records
            .values()
            .filter(|record| query.matches(&record.location))
            .cloned()
            .collect();
        sort_by_revision(&mut found);
        Ok(found)
    }

    async fn find_by_locations(
        &self,
        locations: &[Location],
    ) -> Result<Vec<RawRecord>, DatabaseError> {
        self.count_read();
        let records = self.records.read().await;
        let wanted: HashSet<&Location> = locations.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|location| records.get(location).cloned())
            .collect())
    }

    async fn find_parents(&self, child: &Location) -> Result<Vec<Location>, DatabaseError> {
        self.count_read();
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| record.children().contains(child))
            .map(|record| record.location.clone())
            .collect())
    }

    async fn insert(&self, mut record: RawRecord) -> Result<(), DatabaseError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.location) {
            return Err(DatabaseError::duplicate_key(record.location.to_string()));
        }
        if record.edit_info.edited_on.is_none() {
            record.edit_info.edited_on = Some(Utc::now());
        }
        records.insert(record.location.clone(), record);
        Ok(())
    }

    async fn update(
        &self,
        location: &Location,
        update: RecordUpdate,
    ) -> Result<u64, DatabaseError> {
        let mut records = self.records.write().await;
        match records.get_mut(location) {
            Some(record) => {
                update.apply(record);
                record.edit_info.edited_on = Some(Utc::now());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn remove(&self, location: &Location) -> Result<u64, DatabaseError> {
        let mut records = self.records.write().await;
        Ok(records.remove(location).map_or(0, |_| 1))
    }
}
