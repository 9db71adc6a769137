//! Scoped Key-Value Store
//!
//! Routes every field access on a content node to one of the three
//! partitions of its raw record, based on the scope the field declares:
//!
//! | Scope      | Partition                                   |
//! |------------|---------------------------------------------|
//! | `Children` | `definition.children` (whole list, any name) |
//! | `Settings` | `metadata[name]`                            |
//! | `Content`  | `definition.data` (bare value or mapping)   |
//!
//! Per-user scopes are not backed by a node record and fail with
//! `StoreError::InvalidScope`.
//!
//! Writes only touch the in-memory partitions. The store remembers which
//! partitions changed so the owning content store can persist them with
//! [`ScopedKeyValueStore::take_updates`].

use crate::db::RecordUpdate;
use crate::models::{FieldRef, Location, Scope};
use crate::services::error::{StoreError, StoreResult};
use serde_json::{Map, Value};

/// Content field that aliases the whole payload when it is not a mapping
const DATA_FIELD: &str = "data";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopedKeyValueStore {
    data: Value,
    children: Vec<Location>,
    metadata: Map<String, Value>,
    dirty_data: bool,
    dirty_children: bool,
    dirty_metadata: bool,
}

impl ScopedKeyValueStore {
    pub fn new(data: Value, children: Vec<Location>, metadata: Map<String, Value>) -> Self {
        Self {
            data,
            children,
            metadata,
            ..Default::default()
        }
    }

    /// Read a field, `None` when it has no value
    pub fn get(&self, field: &FieldRef) -> StoreResult<Option<Value>> {
        match field.scope {
            Scope::Children => Ok(Some(Value::Array(
                self.children
                    .iter()
                    .map(|child| Value::String(child.to_string()))
                    .collect(),
            ))),
            Scope::Settings => Ok(self.metadata.get(&field.name).cloned()),
            Scope::Content => Ok(match &self.data {
                Value::Object(map) => map.get(&field.name).cloned(),
                Value::Null => None,
                bare if field.name == DATA_FIELD => Some(bare.clone()),
                _ => None,
            }),
            scope => Err(StoreError::InvalidScope { scope }),
        }
    }

    /// Write a field
    ///
    /// # Errors
    ///
    /// - `InvalidScope` for scopes without a backing partition
    /// - `InvalidField` when a children value is not an array of strings, or
    ///   when a named content field is written onto a bare non-null payload
    /// - `Location` when a children entry is not a valid key
    pub fn set(&mut self, field: &FieldRef, value: Value) -> StoreResult<()> {
        match field.scope {
            Scope::Children => {
                let entries = value.as_array().ok_or_else(|| {
                    StoreError::invalid_field(&field.name, "children must be an array of keys")
                })?;
                let children = entries
                    .iter()
                    .map(|entry| {
                        let text = entry.as_str().ok_or_else(|| {
                            StoreError::invalid_field(&field.name, "child keys must be strings")
                        })?;
                        Ok(Location::parse(text)?)
                    })
                    .collect::<StoreResult<Vec<_>>>()?;
                self.set_children(children);
            }
            Scope::Settings => {
                self.metadata.insert(field.name.clone(), value);
                self.dirty_metadata = true;
            }
            Scope::Content => {
                match self.data {
                    Value::Object(ref mut map) => {
                        map.insert(field.name.clone(), value);
                    }
                    _ if field.name == DATA_FIELD => self.data = value,
                    Value::Null => {
                        let mut map = Map::new();
                        map.insert(field.name.clone(), value);
                        self.data = Value::Object(map);
                    }
                    _ => {
                        return Err(StoreError::invalid_field(
                            &field.name,
                            "content payload is a bare value, only 'data' can be written",
                        ))
                    }
                }
                self.dirty_data = true;
            }
            scope => return Err(StoreError::InvalidScope { scope }),
        }
        Ok(())
    }

    /// Remove a field
    ///
    /// Removing a missing settings field is a no-op. On a bare content
    /// payload, removing any field clears the payload to null.
    pub fn delete(&mut self, field: &FieldRef) -> StoreResult<()> {
        match field.scope {
            Scope::Children => self.set_children(Vec::new()),
            Scope::Settings => {
                if self.metadata.remove(&field.name).is_some() {
                    self.dirty_metadata = true;
                }
            }
            Scope::Content => {
                match self.data {
                    Value::Object(ref mut map) => {
                        map.remove(&field.name);
                    }
                    _ => self.data = Value::Null,
                }
                self.dirty_data = true;
            }
            scope => return Err(StoreError::InvalidScope { scope }),
        }
        Ok(())
    }

    /// True if `get` would return a value
    pub fn has(&self, field: &FieldRef) -> StoreResult<bool> {
        Ok(self.get(field)?.is_some())
    }

    pub fn content(&self) -> &Value {
        &self.data
    }

    pub fn children(&self) -> &[Location] {
        &self.children
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn display_name(&self) -> Option<&str> {
        self.metadata.get("display_name").and_then(Value::as_str)
    }

    pub fn set_children(&mut self, children: Vec<Location>) {
        self.children = children;
        self.dirty_children = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_data || self.dirty_children || self.dirty_metadata
    }

    /// Drain pending writes as one update per changed partition
    pub fn take_updates(&mut self) -> Vec<RecordUpdate> {
        let mut updates = Vec::new();
        if std::mem::take(&mut self.dirty_data) {
            updates.push(RecordUpdate::Data(self.data.clone()));
        }
        if std::mem::take(&mut self.dirty_children) {
            updates.push(RecordUpdate::Children(self.children.clone()));
        }
        if std::mem::take(&mut self.dirty_metadata) {
            updates.push(RecordUpdate::Metadata(self.metadata.clone()));
        }
        updates
    }
}
