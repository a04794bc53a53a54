//! Request handlers for both persistence modes.
//!
//! Chunked ("DFS") pipeline: multipart upload -> staging file -> splitter ->
//! replicated chunk writes -> catalog insert. Direct ("no-DFS") pipeline:
//! staging file -> whole-file object + catalog row. Downloads stream; large
//! files are never fully buffered.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        multipart::{Field, Multipart},
        Query, State,
    },
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::catalog::MetadataCatalog;
use crate::chunk::store::{ChunkStore, Reassembler, WholeFileStore};
use crate::chunk::{chunk_object_name, replica_index, ChunkSplitter, ContentHash};
use crate::config::Config;
use crate::error::ServerError;
use crate::storage::StorageError;

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub catalog: MetadataCatalog,
    pub chunks: Arc<ChunkStore>,
    pub reassembler: Reassembler,
    pub whole: WholeFileStore,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub data: String,
    pub file_id: i64,
    /// Locations each chunk was written to; equals the replica count.
    pub replicas: usize,
}

#[derive(Serialize)]
pub struct FileEntry {
    id: i64,
    filename: String,
    total_chunks: i32,
}

#[derive(Serialize)]
pub struct WholeFileEntry {
    id: i64,
    filename: String,
    file_size: i64,
}

#[derive(Serialize)]
pub struct FileListResponse<T> {
    files: Vec<T>,
}

/// GET / - banner
pub async fn index() -> &'static str {
    "chunkdfs file storage server"
}

/// Staged upload on disk; removed on every exit path so the staging area is
/// empty at rest.
struct StagedFile {
    path: PathBuf,
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn validate_filename(filename: &str) -> Result<(), ServerError> {
    if filename.is_empty() {
        return Err(ServerError::InvalidRequest("No selected file".into()));
    }
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(ServerError::InvalidRequest("Invalid filename".into()));
    }
    Ok(())
}

/// Stream a multipart field into the staging area, counting bytes and
/// feeding an optional digest. The chunked pipeline passes no hasher (its
/// splitter accumulates the whole-file digest); direct mode hashes here so
/// the staged file is never read twice.
async fn stage_field(
    config: &Config,
    mut field: Field<'_>,
    filename: &str,
    mut hasher: Option<&mut Sha256>,
) -> Result<(StagedFile, u64), ServerError> {
    let path = config.staging_dir().join(filename);
    let mut file = tokio::fs::File::create(&path).await?;
    let staged = StagedFile { path };

    let mut size = 0u64;
    while let Some(data) = field.chunk().await? {
        if let Some(h) = hasher.as_deref_mut() {
            h.update(&data);
        }
        size += data.len() as u64;
        file.write_all(&data).await?;
    }
    file.flush().await?;
    drop(file);

    Ok((staged, size))
}

/// Pull the `file` field out of a multipart body and stage it.
async fn stage_upload(
    config: &Config,
    multipart: &mut Multipart,
    mut hasher: Option<&mut Sha256>,
) -> Result<(String, StagedFile, u64), ServerError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_default();
        validate_filename(&filename)?;
        let (staged, size) = stage_field(config, field, &filename, hasher.take()).await?;
        return Ok((filename, staged, size));
    }
    Err(ServerError::InvalidRequest("No file part".into()))
}

/// POST /upload - chunked upload: split, replicate, record
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let (filename, staged, size) = stage_upload(&state.config, &mut multipart, None).await?;
    tracing::debug!("staged upload {} ({} bytes)", filename, size);

    let input = tokio::fs::File::open(&staged.path).await?;
    let mut splitter = ChunkSplitter::new(input, state.config.chunk_size);

    let mut chunk_meta: Vec<(u32, ContentHash)> = Vec::new();
    let mut written_names: Vec<String> = Vec::new();
    let mut replicas = state.chunks.replica_count();

    // Persist every chunk before any catalog row exists; a failure here
    // undoes the chunks already written so nothing dangles.
    loop {
        let chunk = match splitter.next_chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                rollback_chunks(&state.chunks, &written_names).await;
                return Err(e.into());
            }
        };

        let name = chunk_object_name(&filename, chunk.seq);
        match state.chunks.put_replicated(&name, chunk.data).await {
            Ok(report) => replicas = report.locations_written,
            Err(e) => {
                rollback_chunks(&state.chunks, &written_names).await;
                return Err(e.into());
            }
        }
        written_names.push(name);
        chunk_meta.push((chunk.seq, chunk.hash));
    }

    let full_hash = splitter.finish();
    let file_id = match state
        .catalog
        .record_file(&filename, &full_hash, &chunk_meta)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            rollback_chunks(&state.chunks, &written_names).await;
            return Err(e.into());
        }
    };

    tracing::info!(
        "uploaded {} as file {} ({} chunks, hash {})",
        filename,
        file_id,
        chunk_meta.len(),
        full_hash
    );

    Ok(Json(UploadResponse {
        data: "File uploaded, chunked, and replicated successfully!".into(),
        file_id,
        replicas,
    }))
}

async fn rollback_chunks(chunks: &ChunkStore, names: &[String]) {
    for name in names {
        chunks.delete_everywhere(name).await;
    }
}

/// GET /list - chunked-mode file listing
pub async fn list_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FileListResponse<FileEntry>>, ServerError> {
    let files = state
        .catalog
        .list_files()
        .await?
        .into_iter()
        .map(|f| FileEntry {
            id: f.id,
            filename: f.filename,
            total_chunks: f.total_chunks,
        })
        .collect();
    Ok(Json(FileListResponse { files }))
}

#[derive(Deserialize)]
pub struct ChunkQuery {
    file_id: Option<String>,
    chunk_order: Option<String>,
}

/// GET /download_chunk?file_id=..&chunk_order=.. - one chunk, raw bytes
pub async fn download_chunk(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChunkQuery>,
) -> Result<Response, ServerError> {
    let (file_id, chunk_order) = match (query.file_id, query.chunk_order) {
        (Some(f), Some(c)) => (f, c),
        _ => {
            return Err(ServerError::InvalidRequest(
                "Missing file_id or chunk_order parameter".into(),
            ))
        }
    };
    let file_id: i64 = file_id
        .parse()
        .map_err(|_| ServerError::InvalidRequest("Invalid file_id parameter".into()))?;
    let seq: u32 = chunk_order
        .parse()
        .ok()
        .filter(|s| *s >= 1)
        .ok_or_else(|| ServerError::InvalidRequest("Invalid chunk_order parameter".into()))?;

    let file = state
        .catalog
        .get_file(file_id)
        .await?
        .ok_or(ServerError::FileNotFound)?;

    let name = chunk_object_name(&file.filename, seq);
    let location = replica_index(seq, state.chunks.replica_count());
    let bytes = match state.chunks.get(location, &name).await {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound(_)) => return Err(ServerError::ChunkNotFound),
        Err(e) => return Err(e.into()),
    };

    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", name),
        )
        .body(Body::from(bytes))
        .unwrap())
}

#[derive(Deserialize)]
pub struct FileQuery {
    file_id: Option<String>,
}

fn parse_file_id(query: FileQuery) -> Result<i64, ServerError> {
    query
        .file_id
        .ok_or_else(|| ServerError::InvalidRequest("Missing file_id parameter".into()))?
        .parse()
        .map_err(|_| ServerError::InvalidRequest("Invalid file_id parameter".into()))
}

/// GET /download?file_id=.. - reassembled file, streamed in chunk order
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ServerError> {
    let file_id = parse_file_id(query)?;
    let file = state
        .catalog
        .get_file(file_id)
        .await?
        .ok_or(ServerError::FileNotFound)?;

    // A chunk missing mid-stream aborts the response body; the prefix
    // already sent cannot be retracted.
    let stream = state
        .reassembler
        .stream(&file.filename, file.total_chunks as u32);

    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.filename),
        )
        .body(Body::from_stream(stream))
        .unwrap())
}

/// GET /db_view - full catalog dump for operational inspection
pub async fn db_view(State(state): State<Arc<AppState>>) -> Result<Response, ServerError> {
    let dump = state.catalog.dump().await?;
    Ok(Json(dump).into_response())
}

/// POST /upload_nodfs - direct upload: one object plus one catalog row
pub async fn upload_nodfs(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let mut hasher = Sha256::new();
    let (filename, staged, size) =
        stage_upload(&state.config, &mut multipart, Some(&mut hasher)).await?;
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    let hash = ContentHash::from_raw(digest);

    // Same-named uploads overwrite the stored object; every upload keeps
    // its own catalog row.
    state.whole.put_from_file(&filename, &staged.path).await?;
    let file_id = state
        .catalog
        .record_whole_file(&filename, &hash, size)
        .await?;

    tracing::info!(
        "uploaded {} directly as file {} ({} bytes, hash {})",
        filename,
        file_id,
        size,
        hash
    );

    Ok(Json(UploadResponse {
        data: "File uploaded successfully (no DFS)!".into(),
        file_id,
        replicas: 1,
    }))
}

/// GET /list_nodfs - direct-mode file listing
pub async fn list_nodfs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FileListResponse<WholeFileEntry>>, ServerError> {
    let files = state
        .catalog
        .list_whole_files()
        .await?
        .into_iter()
        .map(|f| WholeFileEntry {
            id: f.id,
            filename: f.filename,
            file_size: f.file_size,
        })
        .collect();
    Ok(Json(FileListResponse { files }))
}

/// GET /download_nodfs?file_id=.. - whole stored object, streamed
pub async fn download_nodfs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ServerError> {
    let file_id = parse_file_id(query)?;
    let record = state
        .catalog
        .get_whole_file(file_id)
        .await?
        .ok_or(ServerError::FileNotFound)?;

    let reader = state.whole.get_stream(&record.filename).await?;

    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", record.filename),
        )
        .body(Body::from_stream(ReaderStream::new(reader)))
        .unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalStorage, StorageBackend, StorageResult};
    use async_trait::async_trait;
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use sea_orm::Database;
    use tower::ServiceExt;

    const BOUNDARY: &str = "test-boundary";

    fn multipart_body(filename: &str, payload: &[u8]) -> Body {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn upload_request(uri: &str, filename: &str, payload: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(multipart_body(filename, payload))
            .unwrap()
    }

    fn test_config(dir: &tempfile::TempDir, chunk_size: usize) -> Config {
        Config {
            data_dir: dir.path().to_path_buf(),
            chunk_size,
            replica_locations: vec!["folder1".into(), "folder2".into(), "folder3".into()],
            port: 0,
        }
    }

    async fn test_state(config: Config, backend: Arc<dyn StorageBackend>) -> Arc<AppState> {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        crate::db::create_tables(&db).await.unwrap();
        config.ensure_dirs().unwrap();
        let chunks = Arc::new(ChunkStore::new(
            backend.clone(),
            config.replica_locations.clone(),
        ));
        Arc::new(AppState {
            catalog: MetadataCatalog::new(db),
            reassembler: Reassembler::new(chunks.clone()),
            whole: WholeFileStore::new(backend),
            chunks,
            config,
        })
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("report.pdf").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("../etc/passwd").is_err());
        assert!(validate_filename("a/b.txt").is_err());
        assert!(validate_filename("a\\b.txt").is_err());
    }

    #[tokio::test]
    async fn test_direct_upload_records_streamed_digest() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, 1024);
        let backend = Arc::new(LocalStorage::new(config.chunks_root()));
        let state = test_state(config, backend).await;

        let app = crate::api::router().with_state(state.clone());
        let response = app
            .oneshot(upload_request("/upload_nodfs", "hello.txt", b"hello world"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The digest recorded is the one computed while staging; it must
        // equal hashing the payload directly.
        let record = state.catalog.get_whole_file(1).await.unwrap().unwrap();
        assert_eq!(record.filename, "hello.txt");
        assert_eq!(record.file_size, 11);
        assert_eq!(
            record.file_hash,
            ContentHash::from_data(b"hello world").to_hex()
        );

        // Staging area is empty at rest
        assert_eq!(
            std::fs::read_dir(state.config.staging_dir()).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn test_chunked_upload_records_and_replicates() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, 4);
        let backend = Arc::new(LocalStorage::new(config.chunks_root()));
        let state = test_state(config, backend).await;

        let app = crate::api::router().with_state(state.clone());
        let response = app
            .oneshot(upload_request("/upload", "data.txt", b"abcdefghij"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let file = state.catalog.get_file(1).await.unwrap().unwrap();
        assert_eq!(file.total_chunks, 3);
        assert_eq!(file.file_hash, ContentHash::from_data(b"abcdefghij").to_hex());

        // Chunk 2 is served from location (2-1) % 3 = 1
        let bytes = state.chunks.get(1, "data_chunk2.txt").await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"efgh"));

        assert_eq!(
            std::fs::read_dir(state.config.staging_dir()).unwrap().count(),
            0
        );
    }

    /// Backend that persistently rejects writes of the second chunk object.
    struct FailSecondChunk {
        inner: LocalStorage,
    }

    #[async_trait]
    impl StorageBackend for FailSecondChunk {
        async fn get(&self, namespace: &str, key: &str) -> StorageResult<Bytes> {
            self.inner.get(namespace, key).await
        }

        async fn put(&self, namespace: &str, key: &str, data: Bytes) -> StorageResult<()> {
            if key.contains("_chunk2") {
                return Err(StorageError::Other("injected write failure".into()));
            }
            self.inner.put(namespace, key, data).await
        }

        async fn delete(&self, namespace: &str, key: &str) -> StorageResult<()> {
            self.inner.delete(namespace, key).await
        }

        async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
            self.inner.exists(namespace, key).await
        }

        async fn put_from_file(
            &self,
            namespace: &str,
            key: &str,
            local_path: &std::path::Path,
        ) -> StorageResult<()> {
            self.inner.put_from_file(namespace, key, local_path).await
        }

        async fn get_stream(
            &self,
            namespace: &str,
            key: &str,
        ) -> StorageResult<Box<dyn tokio::io::AsyncRead + Unpin + Send>> {
            self.inner.get_stream(namespace, key).await
        }
    }

    #[tokio::test]
    async fn test_failed_upload_rolls_back_earlier_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, 4);
        let backend = Arc::new(FailSecondChunk {
            inner: LocalStorage::new(config.chunks_root()),
        });
        let state = test_state(config, backend).await;

        // Chunk 1 replicates fine, chunk 2 can never be written: the whole
        // upload fails and chunk 1's copies are removed.
        let app = crate::api::router().with_state(state.clone());
        let response = app
            .oneshot(upload_request("/upload", "data.txt", b"abcdefghij"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert!(state.catalog.list_files().await.unwrap().is_empty());
        for i in 0..3 {
            match state.chunks.get(i, "data_chunk1.txt").await {
                Err(StorageError::NotFound(_)) => {}
                other => panic!("expected NotFound, got {:?}", other.map(|b| b.len())),
            }
        }

        assert_eq!(
            std::fs::read_dir(state.config.staging_dir()).unwrap().count(),
            0
        );
    }
}
