//! Database Error Types
//!
//! Errors raised by `DocumentStore` backends. Service-level errors
//! (not-found, duplicate item, addressing) live in `services::error` and
//! wrap these.

use std::path::PathBuf;
use thiserror::Error;

/// Datastore operation errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open the datastore
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: surrealdb::Error,
    },

    /// Failed to initialize tables or indexes
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// A record with the same key already exists
    #[error("Duplicate key: {key}")]
    DuplicateKey { key: String },

    /// SurrealDB operation error
    #[error("Database operation failed: {0}")]
    SurrealError(#[from] surrealdb::Error),

    /// Stored document did not match the record shape
    #[error("Record serialization failed: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Query execution error with context
    #[error("Query failed: {context}")]
    QueryFailed { context: String },
}

impl DatabaseError {
    pub fn connection_failed(path: PathBuf, source: surrealdb::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    pub fn query_failed(context: impl Into<String>) -> Self {
        Self::QueryFailed {
            context: context.into(),
        }
    }
}
