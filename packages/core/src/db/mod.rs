//! Database Layer
//!
//! The `DocumentStore` trait is the only thing the content store knows
//! about its datastore. Two backends implement it:
//!
//! - `SurrealDocumentStore` - SurrealDB, embedded RocksDB or in-memory engine
//! - `MemoryDocumentStore` - plain in-process map, for tests and tooling
//!
//! Stores are constructed explicitly and shared by `Arc`; there is no
//! process-wide registry of store instances.

pub mod document_store;
mod error;
pub mod events;
mod memory_store;
mod surreal_store;

pub use document_store::{DocumentStore, RecordUpdate};
pub use error::DatabaseError;
pub use events::StoreEvent;
pub use memory_store::MemoryDocumentStore;
pub use surreal_store::SurrealDocumentStore;
