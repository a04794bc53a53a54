//! Local filesystem storage backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::backend::{StorageBackend, StorageError, StorageResult};

/// Local filesystem storage backend.
///
/// Stores objects in a flat directory per namespace:
/// ```text
/// {base_path}/
///   {namespace}/
///     {key}
/// ```
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Get the full path for a key
    fn key_path(&self, namespace: &str, key: &str) -> PathBuf {
        self.base_path.join(namespace).join(key)
    }

    /// Ensure parent directory exists
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(namespace, key);
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(format!("{}/{}", namespace, key))
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    async fn put(&self, namespace: &str, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(namespace, key);
        self.ensure_parent(&path).await?;
        fs::write(&path, &data).await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<()> {
        let path = self.key_path(namespace, key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let path = self.key_path(namespace, key);
        Ok(fs::try_exists(&path).await?)
    }

    async fn put_from_file(
        &self,
        namespace: &str,
        key: &str,
        local_path: &Path,
    ) -> StorageResult<()> {
        let path = self.key_path(namespace, key);
        self.ensure_parent(&path).await?;
        fs::copy(local_path, &path).await?;
        Ok(())
    }

    async fn get_stream(
        &self,
        namespace: &str,
        key: &str,
    ) -> StorageResult<Box<dyn tokio::io::AsyncRead + Unpin + Send>> {
        let path = self.key_path(namespace, key);
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(format!("{}/{}", namespace, key))
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Box::new(file))
    }
}
