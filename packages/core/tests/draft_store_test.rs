//! Integration tests for the draft overlay
//!
//! Tests cover:
//! - Draft-first reads and copy-on-write updates
//! - Publishing and discarding drafts
//! - Unversioned categories
//! - Pattern reads across revisions
//! - Draft preference for children loaded through the overlay

mod common;

use anyhow::Result;
use chrono::Utc;
use common::{create_test_store, key, seed_course};
use coursestore_core::db::DocumentStore;
use coursestore_core::models::{Location, RawRecord};
use coursestore_core::services::{ContentStore, Depth, DraftStore, StoreError};
use serde_json::json;

async fn create_test_overlay() -> Result<(ContentStore, DraftStore)> {
    let (db, store) = create_test_store();
    seed_course(db.as_ref(), Utc::now()).await?;
    let drafts = DraftStore::new(store.clone());
    Ok((store, drafts))
}

// =========================================================================
// Read / Write Tests
// =========================================================================

#[tokio::test]
async fn test_write_creates_draft_and_leaves_published() -> Result<()> {
    let (store, drafts) = create_test_overlay().await?;
    let html = key("html", "h1");

    drafts.update_item(&html, json!("<p>Draft copy</p>")).await?;

    let through_overlay = drafts.get_item(&html, Depth::Levels(0)).await?;
    assert!(through_overlay.is_draft());
    assert_eq!(through_overlay.fields().content(), &json!("<p>Draft copy</p>"));
    // Unchanged partitions are carried over from the published record
    assert_eq!(through_overlay.display_name(), "Welcome");

    let published = store.get_item(&html, Depth::Levels(0)).await?;
    assert!(!published.is_draft());
    assert_eq!(
        published.fields().content(),
        &json!("<p>Welcome to the course</p>")
    );
    Ok(())
}

#[tokio::test]
async fn test_second_write_reuses_draft() -> Result<()> {
    let (store, drafts) = create_test_overlay().await?;
    let html = key("html", "h1");

    drafts.update_item(&html, json!("<p>one</p>")).await?;
    drafts.update_item(&html, json!("<p>two</p>")).await?;

    let node = drafts.get_item(&html, Depth::Levels(0)).await?;
    assert_eq!(node.fields().content(), &json!("<p>two</p>"));
    assert!(store.has_item(&html.draft()).await?);
    Ok(())
}

#[tokio::test]
async fn test_publish_folds_draft_into_published() -> Result<()> {
    let (store, drafts) = create_test_overlay().await?;
    let html = key("html", "h1");

    drafts.update_item(&html, json!("<p>Final</p>")).await?;
    drafts.publish(&html).await?;

    let published = store.get_item(&html, Depth::Levels(0)).await?;
    assert_eq!(published.fields().content(), &json!("<p>Final</p>"));
    assert!(!store.has_item(&html.draft()).await?);

    let node = drafts.get_item(&html, Depth::Levels(0)).await?;
    assert!(!node.is_draft());
    Ok(())
}

#[tokio::test]
async fn test_publish_draft_only_item_creates_published() -> Result<()> {
    let (store, drafts) = create_test_overlay().await?;
    let fresh = key("html", "fresh");

    drafts.clone_item(&key("html", "h1"), &fresh).await?;
    assert!(!store.has_item(&fresh).await?);
    assert!(drafts.has_item(&fresh).await?);

    drafts.publish(&fresh).await?;
    assert!(store.has_item(&fresh).await?);
    assert!(!store.has_item(&fresh.draft()).await?);
    Ok(())
}

#[tokio::test]
async fn test_delete_discards_draft_only() -> Result<()> {
    let (store, drafts) = create_test_overlay().await?;
    let problem = key("problem", "p1");

    drafts
        .update_item(&problem, json!({ "data": "<problem>changed</problem>" }))
        .await?;
    drafts.delete_item(&problem).await?;

    let node = drafts.get_item(&problem, Depth::Levels(0)).await?;
    assert!(!node.is_draft());
    assert!(store.has_item(&problem).await?);
    Ok(())
}

#[tokio::test]
async fn test_convert_to_draft() -> Result<()> {
    let (_store, drafts) = create_test_overlay().await?;
    let video = key("video", "vid1");

    let draft = drafts.convert_to_draft(&video).await?;
    assert!(draft.is_draft());
    assert_eq!(draft.display_name(), "Lecture");

    let err = drafts.convert_to_draft(&video).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateItem { .. }));

    let err = drafts
        .convert_to_draft(&key("video", "missing"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_update_missing_item_is_not_found() -> Result<()> {
    let (_store, drafts) = create_test_overlay().await?;

    let err = drafts
        .update_item(&key("html", "missing"), json!("<p/>"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

// =========================================================================
// Unversioned Category Tests
// =========================================================================

#[tokio::test]
async fn test_structure_categories_write_through() -> Result<()> {
    let (store, drafts) = create_test_overlay().await?;
    let chapter = key("chapter", "ch2");

    drafts
        .update_children(&chapter, vec![key("sequential", "s2"), key("sequential", "s3")])
        .await?;

    assert!(!store.has_item(&chapter.draft()).await?);
    let published = store.get_item(&chapter, Depth::Levels(0)).await?;
    assert_eq!(published.child_locations().len(), 2);

    // Publishing has nothing to do
    drafts.publish(&chapter).await?;
    Ok(())
}

// =========================================================================
// Pattern and Children Tests
// =========================================================================

#[tokio::test]
async fn test_get_items_prefers_drafts() -> Result<()> {
    let (_store, drafts) = create_test_overlay().await?;
    let db_pattern = Location::pattern(Some("orgA"), Some("cs101"), None, None)?;

    drafts.update_item(&key("html", "h1"), json!("<p>d</p>")).await?;
    drafts.update_item(&key("video", "vid1"), json!(null)).await?;

    let nodes = drafts.get_items(&db_pattern, Depth::Levels(0)).await?;
    assert_eq!(nodes.len(), 9, "one node per item, drafts replacing published");

    let draft_count = nodes.iter().filter(|node| node.is_draft()).count();
    assert_eq!(draft_count, 2);
    Ok(())
}

#[tokio::test]
async fn test_children_prefer_drafts() -> Result<()> {
    let (store, drafts) = create_test_overlay().await?;
    drafts
        .update_item(&key("html", "h1"), json!("<p>Staged</p>"))
        .await?;

    let vertical = drafts.get_item(&key("vertical", "v1"), Depth::Levels(1)).await?;
    let children = vertical.children().await?;
    assert!(children[0].is_draft());
    assert_eq!(children[0].fields().content(), &json!("<p>Staged</p>"));
    assert!(!children[1].is_draft());

    // Cache misses also resolve through the overlay
    let sequential = drafts.get_item(&key("sequential", "s1"), Depth::Levels(0)).await?;
    let vertical = sequential.children().await?.remove(0);
    let html = vertical.children().await?.remove(0);
    assert!(html.is_draft());

    let published_tree = store.get_item(&key("vertical", "v1"), Depth::Levels(1)).await?;
    assert!(!published_tree.children().await?[0].is_draft());
    Ok(())
}

#[tokio::test]
async fn test_parent_lookup_uses_published_key() -> Result<()> {
    let (store, drafts) = create_test_overlay().await?;
    store.db().insert(RawRecord::new(key("html", "orphan"))).await?;

    let parents = drafts
        .get_parent_locations(&key("html", "h1").draft())
        .await?;
    assert_eq!(parents, vec![key("vertical", "v1")]);

    let course = drafts.get_course_for_item(&key("html", "orphan")).await?;
    assert_eq!(course.category(), "course");
    Ok(())
}
