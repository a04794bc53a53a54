pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

pub use handlers::AppState;

/// Route table for both persistence modes, mirroring the query-parameter
/// style of the original service.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::index))
        // Chunked ("DFS") mode
        .route("/upload", post(handlers::upload))
        .route("/list", get(handlers::list_files))
        .route("/download_chunk", get(handlers::download_chunk))
        .route("/download", get(handlers::download_file))
        .route("/db_view", get(handlers::db_view))
        // Direct ("no-DFS") mode
        .route("/upload_nodfs", post(handlers::upload_nodfs))
        .route("/list_nodfs", get(handlers::list_nodfs))
        .route("/download_nodfs", get(handlers::download_nodfs))
}
