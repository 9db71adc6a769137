//! Field scopes
//!
//! Every field access names the partition it belongs to. Only `Content`,
//! `Children` and `Settings` are backed by a node record; the remaining
//! scopes belong to per-user storage outside this store.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Content,
    Children,
    Settings,
    Parent,
    UserState,
    UserPreferences,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::Content => "content",
            Scope::Children => "children",
            Scope::Settings => "settings",
            Scope::Parent => "parent",
            Scope::UserState => "user_state",
            Scope::UserPreferences => "user_preferences",
        };
        f.write_str(name)
    }
}

/// A field name together with its declared scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub name: String,
    pub scope: Scope,
}

impl FieldRef {
    pub fn new(name: impl Into<String>, scope: Scope) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }

    pub fn content(name: impl Into<String>) -> Self {
        Self::new(name, Scope::Content)
    }

    pub fn settings(name: impl Into<String>) -> Self {
        Self::new(name, Scope::Settings)
    }

    pub fn children() -> Self {
        Self::new("children", Scope::Children)
    }
}
