//! Content Behavior System
//!
//! This module provides the trait-based behavior system for content node
//! categories:
//!
//! - `ContentBehavior` trait - Category-specific validation and indexing
//! - Built-in behaviors (structural containers, problem, html, video, ...)
//! - `BehaviorRegistry` - Category lookup, populated at construction
//!
//! A behavior never owns node state. It is handed the node's
//! `ScopedKeyValueStore` whenever it needs to look at fields, so one
//! behavior instance serves every node of its category.
//!
//! # Examples
//!
//! ```rust
//! use coursestore_core::behaviors::BehaviorRegistry;
//!
//! let registry = BehaviorRegistry::with_builtins();
//! let chapter = registry.resolve("chapter").unwrap();
//! assert!(chapter.has_children());
//! assert!(registry.resolve("poll").is_err());
//! ```

mod builtin;

pub use builtin::{
    ErrorBehavior, HtmlBehavior, ProblemBehavior, StructuralBehavior, VideoBehavior,
};

use crate::config::StoreConfig;
use crate::services::error::{StoreError, StoreResult};
use crate::services::key_value_store::ScopedKeyValueStore;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Category-specific node behavior
pub trait ContentBehavior: Send + Sync {
    /// Category this behavior is registered under
    fn category(&self) -> &str;

    /// Whether nodes of this category carry a children list
    fn has_children(&self) -> bool {
        false
    }

    /// Check a node's fields before it is instantiated
    ///
    /// A failure turns the node into an error node instead of aborting the
    /// surrounding read.
    fn validate(&self, _fields: &ScopedKeyValueStore) -> StoreResult<()> {
        Ok(())
    }

    /// Search document body for a node, `None` for non-indexable categories
    fn index_payload(&self, _fields: &ScopedKeyValueStore) -> Option<Map<String, Value>> {
        None
    }
}

/// Maps categories to behaviors
///
/// Registration happens while the registry is being built; the content
/// store then shares it read-only behind an `Arc`.
#[derive(Default)]
pub struct BehaviorRegistry {
    behaviors: HashMap<String, Arc<dyn ContentBehavior>>,
    fallback: Option<Arc<dyn ContentBehavior>>,
}

impl BehaviorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in category
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for category in StructuralBehavior::CATEGORIES {
            registry.register(Arc::new(StructuralBehavior::new(category)));
        }
        registry.register(Arc::new(ProblemBehavior));
        registry.register(Arc::new(HtmlBehavior::indexed()));
        registry.register(Arc::new(VideoBehavior));
        for category in HtmlBehavior::PAGE_CATEGORIES {
            registry.register(Arc::new(HtmlBehavior::page(category)));
        }
        registry
    }

    /// Built-in registry with the fallback named by `config`
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        let registry = Self::with_builtins();
        match &config.fallback_category {
            Some(category) => registry.with_fallback(category),
            None => Ok(registry),
        }
    }

    /// Register (or replace) the behavior for its category
    pub fn register(&mut self, behavior: Arc<dyn ContentBehavior>) {
        tracing::debug!("Registering behavior for category '{}'", behavior.category());
        self.behaviors
            .insert(behavior.category().to_string(), behavior);
    }

    /// Use an already registered category for unknown categories
    pub fn with_fallback(mut self, category: &str) -> StoreResult<Self> {
        let behavior = self
            .behaviors
            .get(category)
            .cloned()
            .ok_or_else(|| StoreError::unknown_category(category))?;
        self.fallback = Some(behavior);
        Ok(self)
    }

    /// Behavior for `category`, or the fallback
    pub fn resolve(&self, category: &str) -> StoreResult<Arc<dyn ContentBehavior>> {
        self.behaviors
            .get(category)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| StoreError::unknown_category(category))
    }

    pub fn contains(&self, category: &str) -> bool {
        self.behaviors.contains_key(category)
    }

    /// Registered categories, sorted
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = self.behaviors.keys().map(String::as_str).collect();
        categories.sort_unstable();
        categories
    }
}
