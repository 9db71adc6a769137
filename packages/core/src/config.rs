//! Store and indexer configuration
//!
//! Both structs deserialize from any serde format and fall back to
//! [`Default`] for missing fields, so a partial config file is enough.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default look-back window for incremental reindexing
pub const DEFAULT_REINDEX_AGE_SECS: u64 = 60;

/// Configuration for the content store and its datastore backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SurrealDB namespace
    pub namespace: String,

    /// SurrealDB database
    pub database: String,

    /// Table holding raw node records
    pub table: String,

    /// Category whose behavior is used for unregistered categories
    ///
    /// `None` turns unknown categories into error nodes.
    pub fallback_category: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: "coursestore".to_string(),
            database: "content".to_string(),
            table: "modulestore".to_string(),
            fallback_category: None,
        }
    }
}

impl StoreConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("namespace", &self.namespace),
            ("database", &self.database),
            ("table", &self.table),
        ] {
            if value.is_empty() {
                return Err(format!("{} cannot be empty", field));
            }
        }

        // Table name is interpolated into queries
        if !self
            .table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(format!(
                "table '{}' may only contain ASCII letters, digits and '_'",
                self.table
            ));
        }

        Ok(())
    }
}

/// Configuration for search indexing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub courseware_enabled: bool,

    pub library_enabled: bool,

    /// How far back from a trigger time a change still counts as recent
    pub reindex_age_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            courseware_enabled: true,
            library_enabled: false,
            reindex_age_secs: DEFAULT_REINDEX_AGE_SECS,
        }
    }
}

impl IndexerConfig {
    pub fn reindex_age(&self) -> Duration {
        Duration::from_secs(self.reindex_age_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.reindex_age_secs == 0 {
            return Err("reindex_age_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}
