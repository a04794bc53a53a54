//! Chunk persistence and reassembly.
//!
//! `ChunkStore` writes every chunk object to all replica locations (full
//! replication) and reads from exactly the location the round-robin placement
//! assigns — there is no read failover. `Reassembler` turns a file record
//! back into an ordered, lazy byte stream. `WholeFileStore` is the direct
//! (unchunked) mode sharing the same backend.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::Stream;

use crate::chunk::{chunk_object_name, replica_index};
use crate::error::ServerError;
use crate::storage::{namespaces, StorageBackend, StorageError, StorageResult};

/// Bounded retries per replica location before the write is abandoned.
const REPLICA_WRITE_RETRIES: usize = 2;

/// Outcome of a replicated write.
#[derive(Debug, Clone, Copy)]
pub struct ReplicationReport {
    /// Number of locations holding the object. Equals the replica count on
    /// success; partial writes never survive a failed call.
    pub locations_written: usize,
}

/// Writes chunk objects to all replica locations and reads from one.
pub struct ChunkStore {
    backend: Arc<dyn StorageBackend>,
    locations: Vec<String>,
}

impl ChunkStore {
    pub fn new(backend: Arc<dyn StorageBackend>, locations: Vec<String>) -> Self {
        assert!(!locations.is_empty(), "at least one replica location");
        Self { backend, locations }
    }

    pub fn replica_count(&self) -> usize {
        self.locations.len()
    }

    /// Write `data` under `name` to every replica location, sequentially.
    ///
    /// Each location write is retried a bounded number of times. If a
    /// location still fails, copies already written for this object are
    /// removed best-effort and the whole call fails, so a successful return
    /// means the object is present at every location.
    pub async fn put_replicated(
        &self,
        name: &str,
        data: Bytes,
    ) -> StorageResult<ReplicationReport> {
        let mut written: Vec<&str> = Vec::with_capacity(self.locations.len());

        for location in &self.locations {
            let mut attempt = 0;
            loop {
                match self.backend.put(location, name, data.clone()).await {
                    Ok(()) => break,
                    Err(e) if attempt < REPLICA_WRITE_RETRIES => {
                        attempt += 1;
                        tracing::warn!(
                            "replica write to {}/{} failed (attempt {}): {}",
                            location,
                            name,
                            attempt,
                            e
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            "replica write to {}/{} failed, rolling back {} copies",
                            location,
                            name,
                            written.len()
                        );
                        for done in &written {
                            if let Err(del) = self.backend.delete(done, name).await {
                                tracing::warn!("rollback delete {}/{}: {}", done, name, del);
                            }
                        }
                        return Err(e);
                    }
                }
            }
            written.push(location);
        }

        Ok(ReplicationReport {
            locations_written: written.len(),
        })
    }

    /// Read a chunk object from exactly one location. `NotFound` if the
    /// object is absent there, even when other replicas still hold it.
    pub async fn get(&self, location_index: usize, name: &str) -> StorageResult<Bytes> {
        let location = self.locations.get(location_index).ok_or_else(|| {
            StorageError::Other(format!("replica index {} out of range", location_index))
        })?;
        self.backend.get(location, name).await
    }

    /// Remove an object from every location, best-effort. Used to undo the
    /// already-persisted chunks of an upload that failed mid-pipeline.
    pub async fn delete_everywhere(&self, name: &str) {
        for location in &self.locations {
            if let Err(e) = self.backend.delete(location, name).await {
                tracing::warn!("cleanup delete {}/{}: {}", location, name, e);
            }
        }
    }
}

/// Streams a chunked file back in sequence order.
#[derive(Clone)]
pub struct Reassembler {
    store: Arc<ChunkStore>,
}

impl Reassembler {
    pub fn new(store: Arc<ChunkStore>) -> Self {
        Self { store }
    }

    /// Lazy, ordered byte stream of the original file.
    ///
    /// For seq in 1..=total_chunks the chunk is resolved via the placement
    /// scheme and read from its assigned replica. A missing chunk ends the
    /// stream with `MissingChunk { seq }`; bytes already yielded stand, the
    /// error is surfaced in-band to the consumer. Dropping the stream stops
    /// all further reads.
    pub fn stream(
        &self,
        filename: &str,
        total_chunks: u32,
    ) -> impl Stream<Item = Result<Bytes, ServerError>> + Send + 'static {
        let store = self.store.clone();
        let filename = filename.to_string();

        futures::stream::try_unfold(1u32, move |seq| {
            let store = store.clone();
            let filename = filename.clone();
            async move {
                if seq > total_chunks {
                    return Ok(None);
                }
                let name = chunk_object_name(&filename, seq);
                let location = replica_index(seq, store.replica_count());
                match store.get(location, &name).await {
                    Ok(bytes) => Ok(Some((bytes, seq + 1))),
                    Err(StorageError::NotFound(_)) => Err(ServerError::MissingChunk { seq }),
                    Err(e) => Err(ServerError::Storage(e)),
                }
            }
        })
    }
}

/// Direct mode: one stored object per file, no chunking.
pub struct WholeFileStore {
    backend: Arc<dyn StorageBackend>,
}

impl WholeFileStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Persist a staged upload as a single object. A same-named object is
    /// overwritten; the catalog keeps one row per upload regardless.
    pub async fn put_from_file(&self, filename: &str, staged: &Path) -> StorageResult<()> {
        self.backend
            .put_from_file(namespaces::DIRECT, filename, staged)
            .await
    }

    /// Reader over the stored object's bytes.
    pub async fn get_stream(
        &self,
        filename: &str,
    ) -> StorageResult<Box<dyn tokio::io::AsyncRead + Unpin + Send>> {
        self.backend.get_stream(namespaces::DIRECT, filename).await
    }
}
