//! Course Content Store
//!
//! This crate provides hierarchical storage for course content: typed nodes
//! addressed by structured location keys, persisted in a document
//! datastore, loaded with depth-bounded prefetching and kept searchable by
//! an incremental indexer.
//!
//! # Architecture
//!
//! - **Location keys**: `i4x://org/course/category/name[@revision]`, with
//!   unset fields acting as wildcards in queries
//! - **Scoped fields**: content, children and settings partitions per node
//! - **Per-read snapshots**: each read prefetches its subtree in one batch
//!   query per level before any node is built
//! - **Draft overlay**: staged edits in a parallel `@draft` revision
//! - **SurrealDB**: embedded RocksDB or in-memory datastore backend
//!
//! # Modules
//!
//! - [`models`] - Location keys, raw records and field scopes
//! - [`behaviors`] - Category behaviors and their registry
//! - [`services`] - Content store, draft overlay and search indexer
//! - [`db`] - Datastore abstraction, backends and store events
//! - [`config`] - Store and indexer configuration

pub mod behaviors;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use behaviors::*;
pub use config::*;
pub use models::*;
pub use services::*;
