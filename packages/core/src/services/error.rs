//! Service Layer Error Types
//!
//! `StoreError` is what every content store, draft overlay and caching
//! system operation returns. `SearchIndexingError` is the single aggregate
//! shape the indexer reports failures in.

use crate::db::DatabaseError;
use crate::models::{LocationError, Scope};
use thiserror::Error;

/// Content store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed or under-specified key
    #[error(transparent)]
    Location(#[from] LocationError),

    /// No record at the key
    #[error("Item not found: {location}")]
    ItemNotFound { location: String },

    /// Destination of a clone or insert already exists
    #[error("Item already exists: {location}")]
    DuplicateItem { location: String },

    /// Field access declared a scope no node partition backs
    #[error("Invalid scope for field access: {scope}")]
    InvalidScope { scope: Scope },

    /// Field value does not fit the partition it was written to
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// No behavior registered for a category and no fallback configured
    #[error("No behavior registered for category '{category}'")]
    UnknownCategory { category: String },

    /// No course record for an item's org/course
    #[error("Could not find course at {pattern}")]
    CourseNotFound { pattern: String },

    /// More than one course record for an item's org/course
    #[error("Found {count} courses at {pattern}; there should only be one")]
    AmbiguousCourse { pattern: String, count: usize },

    /// Store or indexer configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Datastore operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(#[from] DatabaseError),
}

impl StoreError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn item_not_found(location: impl ToString) -> Self {
        Self::ItemNotFound {
            location: location.to_string(),
        }
    }

    pub fn duplicate_item(location: impl ToString) -> Self {
        Self::DuplicateItem {
            location: location.to_string(),
        }
    }

    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_category(category: impl Into<String>) -> Self {
        Self::UnknownCategory {
            category: category.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ItemNotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Aggregate of everything that went wrong during one indexing pass
///
/// Indexing keeps going past per-node failures, so the number of documents
/// that did make it into the index is reported alongside the messages.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}: {}", errors.join("; "))]
pub struct SearchIndexingError {
    pub message: String,
    pub errors: Vec<String>,
    pub indexed_count: usize,
}

impl SearchIndexingError {
    pub fn new(message: impl Into<String>, errors: Vec<String>, indexed_count: usize) -> Self {
        Self {
            message: message.into(),
            errors,
            indexed_count,
        }
    }
}
