//! Integration tests for the incremental search indexer
//!
//! Tests cover:
//! - Full reindex documents and events
//! - Incremental passes that skip stale subtrees
//! - Removal of unreachable documents
//! - Per-document and general failures
//! - Disabled indexing

mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use common::{course_key, create_test_store, key, seed_course, seed_course_with_times, RecordingEngine};
use coursestore_core::config::IndexerConfig;
use coursestore_core::db::{DocumentStore, StoreEvent};
use coursestore_core::models::{Location, RawRecord};
use coursestore_core::services::{
    ContentStore, CoursewareIndex, IndexDefinition, LibraryIndex, SearchEngine, SearchIndexer,
    StoreError,
};
use serde_json::json;
use std::sync::Arc;

const DOC_TYPE: &str = "courseware_content";

fn create_indexer(store: &ContentStore, engine: &Arc<RecordingEngine>) -> SearchIndexer<CoursewareIndex> {
    let engine: Arc<dyn SearchEngine> = engine.clone();
    SearchIndexer::new(
        store.clone(),
        Some(engine),
        CoursewareIndex,
        IndexerConfig::default(),
    )
    .expect("default indexer config")
}

fn doc_id(category: &str, name: &str) -> String {
    key(category, name).to_string()
}

// =========================================================================
// Full Reindex Tests
// =========================================================================

#[tokio::test]
async fn test_full_reindex_submits_indexable_nodes() -> Result<()> {
    let (db, store) = create_test_store();
    seed_course(db.as_ref(), Utc::now()).await?;
    let engine = Arc::new(RecordingEngine::new());
    let indexer = create_indexer(&store, &engine);

    let count = indexer.do_reindex(&course_key()).await?;
    assert_eq!(count, Some(3));

    let mut indexed = engine.indexed();
    indexed.sort();
    let mut expected = vec![
        doc_id("html", "h1"),
        doc_id("problem", "p1"),
        doc_id("video", "vid1"),
    ];
    expected.sort();
    assert_eq!(indexed, expected);
    Ok(())
}

#[tokio::test]
async fn test_documents_carry_context_and_start_date() -> Result<()> {
    let (db, store) = create_test_store();
    seed_course(db.as_ref(), Utc::now()).await?;
    let engine = Arc::new(RecordingEngine::new());
    create_indexer(&store, &engine).do_reindex(&course_key()).await?;

    let docs = engine.documents(DOC_TYPE).await;
    let html = docs
        .iter()
        .find(|doc| doc["id"] == json!(doc_id("html", "h1")))
        .expect("html document");

    assert_eq!(html["course"], json!("orgA/cs101/2024"));
    assert_eq!(html["content_type"], json!("Text"));
    assert_eq!(html["content"]["html_content"], json!("Welcome to the course"));
    assert_eq!(html["start_date"], json!("2024-09-01T00:00:00+00:00"));

    let video = docs
        .iter()
        .find(|doc| doc["id"] == json!(doc_id("video", "vid1")))
        .expect("video document");
    assert!(video.get("start_date").is_none());
    Ok(())
}

#[tokio::test]
async fn test_reindex_emits_event() -> Result<()> {
    let (db, store) = create_test_store();
    seed_course(db.as_ref(), Utc::now()).await?;
    let engine = Arc::new(RecordingEngine::new());
    let mut rx = store.subscribe();

    create_indexer(&store, &engine).do_reindex(&course_key()).await?;

    assert_eq!(
        rx.recv().await?,
        StoreEvent::IndexRebuilt {
            name: "edx.course.index.reindexed".to_string(),
            category: "courseware_index".to_string(),
            indexed_count: 3,
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_repeated_full_reindex_is_stable() -> Result<()> {
    let (db, store) = create_test_store();
    seed_course(db.as_ref(), Utc::now()).await?;
    let engine = Arc::new(RecordingEngine::new());
    let indexer = create_indexer(&store, &engine);

    indexer.do_reindex(&course_key()).await?;
    let first = engine.documents(DOC_TYPE).await;
    engine.reset();

    indexer.do_reindex(&course_key()).await?;
    assert_eq!(engine.documents(DOC_TYPE).await, first);
    assert!(engine.removed().is_empty());
    Ok(())
}

// =========================================================================
// Incremental Tests
// =========================================================================

#[tokio::test]
async fn test_incremental_pass_skips_stale_subtree() -> Result<()> {
    let (db, store) = create_test_store();
    let now = Utc::now();
    seed_course_with_times(db.as_ref(), now - Duration::days(30), now).await?;
    let engine = Arc::new(RecordingEngine::new());
    let indexer = create_indexer(&store, &engine);

    indexer.do_reindex(&course_key()).await?;
    engine.reset();

    let count = indexer.index(&course_key(), Some(now)).await?;
    assert_eq!(count, Some(1));
    assert_eq!(engine.indexed(), vec![doc_id("video", "vid1")]);

    // Stale documents stay reachable, so nothing is pruned
    assert!(engine.removed().is_empty());
    assert_eq!(engine.documents(DOC_TYPE).await.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_incremental_pass_picks_up_recent_edit() -> Result<()> {
    let (db, store) = create_test_store();
    let long_ago = Utc::now() - Duration::days(30);
    seed_course(db.as_ref(), long_ago).await?;
    let engine = Arc::new(RecordingEngine::new());
    let indexer = create_indexer(&store, &engine);

    store
        .update_item(&key("problem", "p1"), json!({ "data": "<problem>New</problem>" }))
        .await?;
    let count = indexer.index(&course_key(), Some(Utc::now())).await?;

    // The edited problem's vertical is fresh, so its html sibling goes too
    let mut indexed = engine.indexed();
    indexed.sort();
    assert_eq!(indexed, vec![doc_id("html", "h1"), doc_id("problem", "p1")]);
    assert_eq!(count, Some(2));
    Ok(())
}

// =========================================================================
// Removal Tests
// =========================================================================

#[tokio::test]
async fn test_deleted_node_is_removed_once() -> Result<()> {
    let (db, store) = create_test_store();
    seed_course(db.as_ref(), Utc::now()).await?;
    let engine = Arc::new(RecordingEngine::new());
    let indexer = create_indexer(&store, &engine);
    indexer.do_reindex(&course_key()).await?;
    engine.reset();

    store
        .update_children(&key("vertical", "v1"), vec![key("problem", "p1")])
        .await?;
    store.delete_item(&key("html", "h1")).await?;
    indexer.do_reindex(&course_key()).await?;

    assert_eq!(engine.removed(), vec![doc_id("html", "h1")]);
    assert!(!engine.indexed().contains(&doc_id("html", "h1")));
    assert_eq!(engine.documents(DOC_TYPE).await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_structural_ids_count_as_reachable() -> Result<()> {
    let (db, store) = create_test_store();
    seed_course(db.as_ref(), Utc::now()).await?;
    let engine = Arc::new(RecordingEngine::new());

    // Containers are never submitted, but every walked node that is
    // indexable or has children marks its id reachable. A document stored
    // under a container's id therefore survives the removal pass.
    engine
        .index(
            DOC_TYPE,
            json!({ "id": doc_id("vertical", "v1"), "course": "orgA/cs101/2024" }),
        )
        .await?;
    engine.reset();

    create_indexer(&store, &engine).do_reindex(&course_key()).await?;

    assert!(!engine.indexed().contains(&doc_id("vertical", "v1")));
    assert!(!engine.removed().contains(&doc_id("vertical", "v1")));
    assert_eq!(engine.documents(DOC_TYPE).await.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_unrelated_document_is_removed() -> Result<()> {
    let (db, store) = create_test_store();
    seed_course(db.as_ref(), Utc::now()).await?;
    let engine = Arc::new(RecordingEngine::new());

    engine
        .index(
            DOC_TYPE,
            json!({ "id": doc_id("html", "orphan"), "course": "orgA/cs101/2024" }),
        )
        .await?;
    engine
        .index(
            DOC_TYPE,
            json!({ "id": "i4x://orgB/other/html/x", "course": "orgB/other/2024" }),
        )
        .await?;
    engine.reset();

    create_indexer(&store, &engine).do_reindex(&course_key()).await?;

    // Only documents of the reindexed course are pruned
    assert_eq!(engine.removed(), vec![doc_id("html", "orphan")]);
    Ok(())
}

// =========================================================================
// Failure Tests
// =========================================================================

#[tokio::test]
async fn test_rejected_document_is_reported() -> Result<()> {
    let (db, store) = create_test_store();
    seed_course(db.as_ref(), Utc::now()).await?;
    let engine = Arc::new(RecordingEngine::new());
    engine.reject(doc_id("problem", "p1"));

    let err = create_indexer(&store, &engine)
        .index(&course_key(), None)
        .await
        .unwrap_err();

    assert_eq!(err.message, "Error(s) present during indexing");
    assert_eq!(err.indexed_count, 2);
    assert_eq!(
        err.errors,
        vec![format!("Could not index item: {}", key("problem", "p1"))]
    );
    Ok(())
}

#[tokio::test]
async fn test_walk_failure_keeps_document_errors() -> Result<()> {
    let (db, store) = create_test_store();
    seed_course(db.as_ref(), Utc::now()).await?;
    let engine = Arc::new(RecordingEngine::new());
    engine.reject(doc_id("problem", "p1"));

    // Dangling child reference
    store
        .update_children(&key("sequential", "s2"), vec![key("video", "gone")])
        .await?;

    let err = create_indexer(&store, &engine)
        .index(&course_key(), None)
        .await
        .unwrap_err();
    assert_eq!(
        err.errors,
        vec![
            format!("Could not index item: {}", key("problem", "p1")),
            "General indexing error occurred".to_string(),
        ]
    );
    assert_eq!(err.indexed_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_root_is_general_error() -> Result<()> {
    let (_db, store) = create_test_store();
    let engine = Arc::new(RecordingEngine::new());

    let err = create_indexer(&store, &engine)
        .index(&course_key(), None)
        .await
        .unwrap_err();
    assert_eq!(err.errors.len(), 1);
    assert_eq!(err.indexed_count, 0);
    Ok(())
}

// =========================================================================
// Disabled Indexing Tests
// =========================================================================

#[tokio::test]
async fn test_no_engine_is_a_no_op() -> Result<()> {
    let (db, store) = create_test_store();
    seed_course(db.as_ref(), Utc::now()).await?;

    let indexer = SearchIndexer::new(store, None, CoursewareIndex, IndexerConfig::default())?;
    assert_eq!(indexer.do_reindex(&course_key()).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_zero_reindex_age_is_rejected() -> Result<()> {
    let (_db, store) = create_test_store();
    let config = IndexerConfig {
        reindex_age_secs: 0,
        ..Default::default()
    };

    let result = SearchIndexer::new(store, None, CoursewareIndex, config);
    assert!(matches!(result, Err(StoreError::InvalidConfig(_))));
    Ok(())
}

#[tokio::test]
async fn test_library_index_disabled_by_default() -> Result<()> {
    let (db, store) = create_test_store();
    seed_course(db.as_ref(), Utc::now()).await?;
    let engine: Arc<dyn SearchEngine> = Arc::new(RecordingEngine::new());

    let indexer = SearchIndexer::new(store, Some(engine), LibraryIndex, IndexerConfig::default())?;
    assert_eq!(indexer.index(&course_key(), None).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_library_index_definition() -> Result<()> {
    let (db, store) = create_test_store();
    let library = Location::new("orgA", "lib1", "library", "library")?;
    let block = Location::new("orgA", "lib1", "problem", "q1")?;
    db.insert(RawRecord::new(library.clone()).with_children(vec![block.clone()]))
        .await?;
    db.insert(
        RawRecord::new(block.clone())
            .with_setting("display_name", json!("Quiz"))
            .with_data(json!({ "data": "<problem>Pick one</problem>" })),
    )
    .await?;

    let engine = Arc::new(RecordingEngine::new());
    let search: Arc<dyn SearchEngine> = engine.clone();
    let config = IndexerConfig {
        library_enabled: true,
        ..Default::default()
    };
    let indexer = SearchIndexer::new(store, Some(search), LibraryIndex, config)?;

    assert_eq!(indexer.index(&library, None).await?, Some(1));
    let docs = engine.documents("library_content").await;
    assert_eq!(docs[0]["library"], json!("orgA/lib1/library"));
    assert_eq!(docs[0]["content"]["capa_content"], json!("Pick one"));
    assert_eq!(
        indexer.definition().document_id(&block.draft()),
        block.to_string()
    );
    Ok(())
}
