//! Storage backend trait definition.
//!
//! Abstracts the byte storage under the chunk and direct-mode stores to a
//! "put/get bytes by (namespace, key)" capability. Namespaces map to the
//! replica directories plus the direct-mode area.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::path::Path;

/// Storage error types
#[derive(Debug)]
pub enum StorageError {
    /// Object not found
    NotFound(String),
    /// IO error
    Io(std::io::Error),
    /// Other error
    Other(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(key) => write!(f, "Object not found: {}", key),
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::Other(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage backend trait for pluggable storage.
///
/// Keys are flat object names within a namespace; the chunk naming scheme
/// (`<base>_chunk<seq><ext>`) is the only addressing layer above this.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get an object by namespace and key
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Bytes>;

    /// Put an object by namespace and key, overwriting any existing object
    async fn put(&self, namespace: &str, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object by namespace and key
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// Stream a local file into storage (for large objects)
    async fn put_from_file(&self, namespace: &str, key: &str, local_path: &Path) -> StorageResult<()>;

    /// Get a reader for streaming large objects
    async fn get_stream(
        &self,
        namespace: &str,
        key: &str,
    ) -> StorageResult<Box<dyn tokio::io::AsyncRead + Unpin + Send>>;
}

/// Storage namespaces
pub mod namespaces {
    /// Whole-file objects (direct mode)
    pub const DIRECT: &str = "nodfs";
    /// Transient staging area for in-flight uploads
    pub const STAGING: &str = "tmp";
}
