//! Shared fixtures for integration tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursestore_core::config::StoreConfig;
use coursestore_core::db::{DocumentStore, MemoryDocumentStore};
use coursestore_core::models::{Location, RawRecord};
use coursestore_core::services::{
    ContentStore, InMemorySearchEngine, SearchEngine, SearchError, SearchResponse,
};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Once};

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn key(category: &str, name: &str) -> Location {
    Location::new("orgA", "cs101", category, name).expect("valid test key")
}

pub fn course_key() -> Location {
    key("course", "2024")
}

/// Content store over a fresh in-memory datastore
pub fn create_test_store() -> (Arc<MemoryDocumentStore>, ContentStore) {
    init_tracing();
    let db = Arc::new(MemoryDocumentStore::new());
    let store = ContentStore::new(db.clone(), &StoreConfig::default()).expect("default config");
    (db, store)
}

fn named(record: RawRecord, display_name: &str) -> RawRecord {
    record.with_setting("display_name", json!(display_name))
}

/// Insert the fixture course, every record stamped with `edited_on`
///
/// ```text
/// course 2024 (tabs: [])
/// ├── chapter ch1
/// │   └── sequential s1
/// │       └── vertical v1
/// │           ├── html h1
/// │           └── problem p1
/// └── chapter ch2
///     └── sequential s2
///         └── video vid1
/// ```
pub async fn seed_course(db: &dyn DocumentStore, edited_on: DateTime<Utc>) -> Result<()> {
    seed_course_with_times(db, edited_on, edited_on).await
}

/// Like `seed_course`, with separate edit times for the two chapters' subtrees
pub async fn seed_course_with_times(
    db: &dyn DocumentStore,
    ch1_edited_on: DateTime<Utc>,
    ch2_edited_on: DateTime<Utc>,
) -> Result<()> {
    let ch1 = vec![
        named(RawRecord::new(key("chapter", "ch1")), "Week 1")
            .with_children(vec![key("sequential", "s1")]),
        named(RawRecord::new(key("sequential", "s1")), "Lesson 1")
            .with_children(vec![key("vertical", "v1")]),
        named(RawRecord::new(key("vertical", "v1")), "Unit 1")
            .with_children(vec![key("html", "h1"), key("problem", "p1")]),
        named(RawRecord::new(key("html", "h1")), "Welcome")
            .with_data(json!("<p>Welcome to the course</p>"))
            .with_setting("start", json!("2024-09-01T00:00:00+00:00")),
        named(RawRecord::new(key("problem", "p1")), "Warm up")
            .with_data(json!({ "data": "<problem><p>What is 2+2?</p></problem>" })),
    ];
    let ch2 = vec![
        named(RawRecord::new(key("chapter", "ch2")), "Week 2")
            .with_children(vec![key("sequential", "s2")]),
        named(RawRecord::new(key("sequential", "s2")), "Lesson 2")
            .with_children(vec![key("video", "vid1")]),
        named(RawRecord::new(key("video", "vid1")), "Lecture"),
    ];

    for record in ch1 {
        db.insert(record.edited_at(ch1_edited_on)).await?;
    }
    for record in ch2 {
        db.insert(record.edited_at(ch2_edited_on)).await?;
    }

    let course = named(RawRecord::new(course_key()), "Intro to Testing")
        .with_children(vec![key("chapter", "ch1"), key("chapter", "ch2")])
        .with_setting("tabs", json!([]))
        .edited_at(ch1_edited_on.max(ch2_edited_on));
    db.insert(course).await?;
    Ok(())
}

/// Search engine that records calls and can be told to reject documents
#[derive(Default)]
pub struct RecordingEngine {
    inner: InMemorySearchEngine,
    indexed: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    rejected_ids: Mutex<HashSet<String>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&self, id: impl Into<String>) {
        self.rejected_ids.lock().unwrap().insert(id.into());
    }

    pub fn indexed(&self) -> Vec<String> {
        self.indexed.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.indexed.lock().unwrap().clear();
        self.removed.lock().unwrap().clear();
    }

    pub async fn documents(&self, doc_type: &str) -> Vec<Value> {
        self.inner.documents(doc_type).await
    }
}

#[async_trait]
impl SearchEngine for RecordingEngine {
    async fn index(&self, doc_type: &str, document: Value) -> Result<(), SearchError> {
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if self.rejected_ids.lock().unwrap().contains(&id) {
            return Err(SearchError::backend(format!("rejected {}", id)));
        }

        self.indexed.lock().unwrap().push(id);
        self.inner.index(doc_type, document).await
    }

    async fn search(
        &self,
        doc_type: &str,
        field_filter: &Map<String, Value>,
        exclude_ids: &HashSet<String>,
    ) -> Result<SearchResponse, SearchError> {
        self.inner.search(doc_type, field_filter, exclude_ids).await
    }

    async fn remove(&self, doc_type: &str, id: &str) -> Result<(), SearchError> {
        self.removed.lock().unwrap().push(id.to_string());
        self.inner.remove(doc_type, id).await
    }
}
