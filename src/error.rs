use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("File not found")]
    FileNotFound,

    #[error("Chunk file not found")]
    ChunkNotFound,

    #[error("Chunk {seq} missing")]
    MissingChunk { seq: u32 },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid upload body: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::InvalidRequest(_) | ServerError::Multipart(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::FileNotFound
            | ServerError::ChunkNotFound
            | ServerError::MissingChunk { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Storage(StorageError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ServerError::Database(_) | ServerError::Storage(_) | ServerError::Io(_) => {
                tracing::error!("request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
