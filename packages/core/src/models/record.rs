//! Raw Node Records
//!
//! The datastore's representation of one content node. A record is split
//! into three partitions:
//!
//! - `definition.data` - node-type-specific content (bare value or mapping)
//! - `definition.children` - ordered child keys
//! - `metadata` - settings such as `display_name` or `start`
//!
//! Records are owned by the content store and only change through its
//! update operations.

use crate::models::Location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Content and structure of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub data: Value,

    #[serde(default)]
    pub children: Vec<Location>,
}

/// Edit bookkeeping maintained by the datastore
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditInfo {
    /// Last time any partition of this record was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub location: Location,

    #[serde(default)]
    pub definition: Definition,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default)]
    pub edit_info: EditInfo,
}

impl RawRecord {
    /// Empty record at `location`
    pub fn new(location: Location) -> Self {
        Self {
            location,
            definition: Definition::default(),
            metadata: Map::new(),
            edit_info: EditInfo::default(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.definition.data = data;
        self
    }

    pub fn with_children(mut self, children: Vec<Location>) -> Self {
        self.definition.children = children;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set a single settings field
    pub fn with_setting(mut self, field: &str, value: Value) -> Self {
        self.metadata.insert(field.to_string(), value);
        self
    }

    pub fn edited_at(mut self, edited_on: DateTime<Utc>) -> Self {
        self.edit_info.edited_on = Some(edited_on);
        self
    }

    pub fn category(&self) -> Option<&str> {
        self.location.category()
    }

    pub fn children(&self) -> &[Location] {
        &self.definition.children
    }
}
