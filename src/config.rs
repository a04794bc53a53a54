//! Server configuration.
//!
//! Everything path- and size-related is resolved once at process start and
//! handed to components explicitly; nothing reads ambient globals afterwards.

use std::path::PathBuf;

/// Fixed chunk window: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default replica locations under the chunks root. Every chunk object is
/// written to all of them; reads pick one by round-robin over the sequence.
pub const DEFAULT_REPLICA_LOCATIONS: [&str; 3] = ["folder1", "folder2", "folder3"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for the catalog database and all stored objects.
    pub data_dir: PathBuf,
    /// Fixed chunk window in bytes.
    pub chunk_size: usize,
    /// Ordered replica location names; fixed at boot, never mutated.
    pub replica_locations: Vec<String>,
    /// HTTP listen port.
    pub port: u16,
}

impl Config {
    /// Build from environment: `CHUNKDFS_DATA_DIR` (default: a directory
    /// under the system temp dir) and `PORT` (default 5000).
    pub fn from_env() -> Self {
        let data_dir = std::env::var("CHUNKDFS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("chunkdfs-data"));

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5000);

        Self {
            data_dir,
            chunk_size: DEFAULT_CHUNK_SIZE,
            replica_locations: DEFAULT_REPLICA_LOCATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            port,
        }
    }

    /// Root under which all object namespaces (replicas, direct area,
    /// staging) live.
    pub fn chunks_root(&self) -> PathBuf {
        self.data_dir.join("assets").join("chunks")
    }

    /// Transient staging area for in-flight uploads. Empty at rest.
    pub fn staging_dir(&self) -> PathBuf {
        self.chunks_root().join(crate::storage::namespaces::STAGING)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("file_chunks.db")
    }

    /// Provision the on-disk layout at boot.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.staging_dir())?;
        std::fs::create_dir_all(self.chunks_root().join(crate::storage::namespaces::DIRECT))?;
        for location in &self.replica_locations {
            std::fs::create_dir_all(self.chunks_root().join(location))?;
        }
        Ok(())
    }
}
