//! Store Events
//!
//! Events emitted by the content store when data changes, and by the
//! indexer when a full reindex finishes. They follow the observer pattern
//! over a tokio broadcast channel so outer layers (a save-triggered
//! reindexer, analytics delivery) can react without coupling to the store.
//!
//! Emission never fails: an event with no subscribers is simply dropped.

use crate::models::Location;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StoreEvent {
    /// A record was inserted or cloned into place
    ItemCreated { location: Location },

    /// One partition (`data`, `children` or `metadata`) of a record was replaced
    ItemUpdated {
        location: Location,
        partition: String,
    },

    /// A record was removed
    ItemDeleted { location: Location },

    /// A full reindex of a course or library finished
    #[serde(rename_all = "camelCase")]
    IndexRebuilt {
        name: String,
        category: String,
        indexed_count: usize,
    },
}

impl StoreEvent {
    /// Location the event refers to, if any
    pub fn location(&self) -> Option<&Location> {
        match self {
            StoreEvent::ItemCreated { location }
            | StoreEvent::ItemUpdated { location, .. }
            | StoreEvent::ItemDeleted { location } => Some(location),
            StoreEvent::IndexRebuilt { .. } => None,
        }
    }
}
