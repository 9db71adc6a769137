//! Structure hooks
//!
//! Category-specific side effects of content store writes. A hook sees the
//! store it was triggered from and may write through it; those writes run
//! the hooks of the record they touch in turn.

use crate::models::{Location, RawRecord};
use crate::services::content_store::ContentStore;
use crate::services::error::StoreResult;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait StructureHook: Send + Sync {
    /// After `record` was cloned into place at `location`
    async fn on_clone(
        &self,
        _store: &ContentStore,
        _location: &Location,
        _record: &RawRecord,
    ) -> StoreResult<()> {
        Ok(())
    }

    /// Before the settings of `location` are replaced with `metadata`
    async fn on_metadata_update(
        &self,
        _store: &ContentStore,
        _location: &Location,
        _metadata: &Map<String, Value>,
    ) -> StoreResult<()> {
        Ok(())
    }

    /// Before the existing record at `location` is removed
    async fn on_delete(&self, _store: &ContentStore, _location: &Location) -> StoreResult<()> {
        Ok(())
    }
}

/// Category to hooks mapping
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Vec<Arc<dyn StructureHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the static tab mirroring hook
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("static_tab", Arc::new(StaticTabHook));
        registry
    }

    pub fn register(&mut self, category: impl Into<String>, hook: Arc<dyn StructureHook>) {
        self.hooks.entry(category.into()).or_default().push(hook);
    }

    pub fn for_category(&self, category: &str) -> &[Arc<dyn StructureHook>] {
        self.hooks.get(category).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Mirrors static tabs in their course's `tabs` setting
///
/// Each tab entry is `{"type": "static_tab", "name": ..., "url_slug": ...}`
/// where `url_slug` is the tab's key name.
pub struct StaticTabHook;

impl StaticTabHook {
    async fn rewrite_tabs<F>(store: &ContentStore, location: &Location, rewrite: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Vec<Value>) + Send,
    {
        let course = store.get_course_for_item(location).await?;
        let mut tabs = course.tabs();
        rewrite(&mut tabs);

        let mut metadata = course.fields().metadata().clone();
        metadata.insert("tabs".to_string(), Value::Array(tabs));
        store.update_metadata(course.location(), metadata).await
    }
}

fn is_tab_for(tab: &Value, slug: &str) -> bool {
    tab.get("url_slug").and_then(Value::as_str) == Some(slug)
}

#[async_trait]
impl StructureHook for StaticTabHook {
    async fn on_clone(
        &self,
        store: &ContentStore,
        location: &Location,
        record: &RawRecord,
    ) -> StoreResult<()> {
        let slug = location.name().unwrap_or_default().to_string();
        let name = record
            .metadata
            .get("display_name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| slug.replace('_', " "));

        tracing::debug!("Adding tab '{}' for {}", name, location);
        Self::rewrite_tabs(store, location, move |tabs| {
            tabs.push(json!({ "type": "static_tab", "name": name, "url_slug": slug }));
        })
        .await
    }

    async fn on_metadata_update(
        &self,
        store: &ContentStore,
        location: &Location,
        metadata: &Map<String, Value>,
    ) -> StoreResult<()> {
        let slug = location.name().unwrap_or_default().to_string();
        let name = metadata.get("display_name").cloned().unwrap_or(Value::Null);

        Self::rewrite_tabs(store, location, move |tabs| {
            if let Some(tab) = tabs.iter_mut().find(|tab| is_tab_for(tab, &slug)) {
                if let Some(entry) = tab.as_object_mut() {
                    entry.insert("name".to_string(), name);
                }
            }
        })
        .await
    }

    async fn on_delete(&self, store: &ContentStore, location: &Location) -> StoreResult<()> {
        let slug = location.name().unwrap_or_default().to_string();

        tracing::debug!("Removing tab '{}'", slug);
        Self::rewrite_tabs(store, location, move |tabs| {
            tabs.retain(|tab| !is_tab_for(tab, &slug));
        })
        .await
    }
}
