//! Storage backend abstraction.
//!
//! Provides a pluggable byte-storage layer under the chunk and direct-mode
//! stores, backed by the local filesystem.

mod backend;
mod local;

pub use backend::{namespaces, StorageBackend, StorageError, StorageResult};
pub use local::LocalStorage;
