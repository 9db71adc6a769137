//! Built-in behaviors
//!
//! Structural containers (course, chapter, sequential, vertical, library)
//! carry children but no searchable text. Leaves carry content: problems
//! and html are indexed by their text, video by its title. Course pages
//! (static_tab, about, course_info) are html-shaped but stay out of the
//! search index.

use crate::behaviors::ContentBehavior;
use crate::models::FieldRef;
use crate::services::error::{StoreError, StoreResult};
use crate::services::key_value_store::ScopedKeyValueStore;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;

fn tag_regex() -> &'static Regex {
    static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
    TAG_REGEX.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn whitespace_regex() -> &'static Regex {
    static WHITESPACE_REGEX: OnceLock<Regex> = OnceLock::new();
    WHITESPACE_REGEX.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Markup-free text of an html or problem body
pub(crate) fn strip_markup(markup: &str) -> String {
    let text = tag_regex().replace_all(markup, " ");
    whitespace_regex().replace_all(&text, " ").trim().to_string()
}

/// Body text of a content payload, whether bare or under `data`
fn body_text(fields: &ScopedKeyValueStore) -> String {
    fields
        .get(&FieldRef::content("data"))
        .ok()
        .flatten()
        .and_then(|value| value.as_str().map(strip_markup))
        .unwrap_or_default()
}

fn document(
    fields: &ScopedKeyValueStore,
    content_type: &str,
    extra: Option<(&str, Value)>,
) -> Map<String, Value> {
    let mut content = Map::new();
    content.insert(
        "display_name".to_string(),
        json!(fields.display_name().unwrap_or_default()),
    );
    if let Some((field, value)) = extra {
        content.insert(field.to_string(), value);
    }

    let mut payload = Map::new();
    payload.insert("content".to_string(), Value::Object(content));
    payload.insert("content_type".to_string(), json!(content_type));
    payload
}

/// Container categories
pub struct StructuralBehavior {
    category: &'static str,
}

impl StructuralBehavior {
    pub const CATEGORIES: [&'static str; 5] =
        ["course", "chapter", "sequential", "vertical", "library"];

    pub fn new(category: &'static str) -> Self {
        Self { category }
    }
}

impl ContentBehavior for StructuralBehavior {
    fn category(&self) -> &str {
        self.category
    }

    fn has_children(&self) -> bool {
        true
    }

    fn validate(&self, fields: &ScopedKeyValueStore) -> StoreResult<()> {
        // The course tab list is rewritten by the static tab hook
        if self.category == "course" {
            if let Some(tabs) = fields.metadata().get("tabs") {
                if !tabs.is_array() {
                    return Err(StoreError::invalid_field("tabs", "expected a list of tabs"));
                }
            }
        }
        Ok(())
    }
}

pub struct ProblemBehavior;

impl ContentBehavior for ProblemBehavior {
    fn category(&self) -> &str {
        "problem"
    }

    fn index_payload(&self, fields: &ScopedKeyValueStore) -> Option<Map<String, Value>> {
        Some(document(
            fields,
            "CAPA",
            Some(("capa_content", json!(body_text(fields)))),
        ))
    }
}

/// Html leaves and html-shaped course pages
pub struct HtmlBehavior {
    category: &'static str,
    indexed: bool,
}

impl HtmlBehavior {
    pub const PAGE_CATEGORIES: [&'static str; 3] = ["static_tab", "about", "course_info"];

    /// The searchable `html` category
    pub fn indexed() -> Self {
        Self {
            category: "html",
            indexed: true,
        }
    }

    /// A course page category that is not searchable
    pub fn page(category: &'static str) -> Self {
        Self {
            category,
            indexed: false,
        }
    }
}

impl ContentBehavior for HtmlBehavior {
    fn category(&self) -> &str {
        self.category
    }

    fn validate(&self, fields: &ScopedKeyValueStore) -> StoreResult<()> {
        match fields.get(&FieldRef::content("data"))? {
            None | Some(Value::String(_)) => Ok(()),
            Some(_) => Err(StoreError::invalid_field("data", "html body must be a string")),
        }
    }

    fn index_payload(&self, fields: &ScopedKeyValueStore) -> Option<Map<String, Value>> {
        self.indexed.then(|| {
            document(
                fields,
                "Text",
                Some(("html_content", json!(body_text(fields)))),
            )
        })
    }
}

pub struct VideoBehavior;

impl ContentBehavior for VideoBehavior {
    fn category(&self) -> &str {
        "video"
    }

    fn index_payload(&self, fields: &ScopedKeyValueStore) -> Option<Map<String, Value>> {
        Some(document(fields, "Video", None))
    }
}

/// Stand-in for nodes that failed to resolve or validate
pub struct ErrorBehavior;

impl ContentBehavior for ErrorBehavior {
    fn category(&self) -> &str {
        "error"
    }
}
