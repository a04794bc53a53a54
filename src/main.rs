mod api;
mod catalog;
mod chunk;
mod config;
mod db;
mod error;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use catalog::MetadataCatalog;
use chunk::store::{ChunkStore, Reassembler, WholeFileStore};
use config::Config;
use storage::{LocalStorage, StorageBackend};

/// Upload body cap: 1 GiB.
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chunkdfs=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    config
        .ensure_dirs()
        .expect("Failed to provision data directories");
    tracing::info!("Data directory: {:?}", config.data_dir);
    tracing::info!(
        "Replica locations: {:?} (chunk size {} bytes)",
        config.replica_locations,
        config.chunk_size
    );

    // Initialize the catalog database
    let db = db::init_database(&config.db_path())
        .await
        .expect("Failed to initialize database");

    let backend: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(config.chunks_root()));
    let chunks = Arc::new(ChunkStore::new(
        backend.clone(),
        config.replica_locations.clone(),
    ));

    let state = Arc::new(AppState {
        catalog: MetadataCatalog::new(db),
        reassembler: Reassembler::new(chunks.clone()),
        whole: WholeFileStore::new(backend),
        chunks,
        config: config.clone(),
    });

    let app = api::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(listener, app)
        .await
        .expect("Server error");
}
