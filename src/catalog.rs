//! Metadata catalog: file-level and chunk-level records for both persistence
//! modes.
//!
//! All records are append-only; re-uploading a name adds a new record rather
//! than updating an old one. A chunked file's row and its chunk rows are
//! inserted in one transaction, so a reader never observes a file record
//! with partial chunk rows.

use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, QueryOrder, Set, TransactionTrait,
};

use crate::chunk::ContentHash;
use crate::db::entities::{file_chunk, stored_file, whole_file};

/// Full contents of all three record kinds, for operational inspection.
#[derive(Debug, serde::Serialize)]
pub struct CatalogDump {
    pub files: Vec<stored_file::Model>,
    pub chunks: Vec<file_chunk::Model>,
    pub files_nodfs: Vec<whole_file::Model>,
}

#[derive(Clone)]
pub struct MetadataCatalog {
    db: DatabaseConnection,
}

impl MetadataCatalog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Record a chunked upload: one file row plus one chunk row per
    /// `(seq, hash)` entry, atomically. Returns the assigned file id.
    pub async fn record_file(
        &self,
        filename: &str,
        file_hash: &ContentHash,
        chunks: &[(u32, ContentHash)],
    ) -> Result<i64, DbErr> {
        let txn = self.db.begin().await?;

        let file = stored_file::ActiveModel {
            filename: Set(filename.to_string()),
            file_hash: Set(file_hash.to_hex()),
            total_chunks: Set(chunks.len() as i32),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for (seq, hash) in chunks {
            file_chunk::ActiveModel {
                file_id: Set(file.id),
                chunk_order: Set(*seq as i32),
                chunk_hash: Set(hash.to_hex()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(file.id)
    }

    pub async fn list_files(&self) -> Result<Vec<stored_file::Model>, DbErr> {
        stored_file::Entity::find()
            .order_by_asc(stored_file::Column::Id)
            .all(&self.db)
            .await
    }

    pub async fn get_file(&self, id: i64) -> Result<Option<stored_file::Model>, DbErr> {
        stored_file::Entity::find_by_id(id).one(&self.db).await
    }

    /// Record a direct-mode upload. Returns the assigned id (a namespace
    /// independent of chunked-mode ids).
    pub async fn record_whole_file(
        &self,
        filename: &str,
        file_hash: &ContentHash,
        file_size: u64,
    ) -> Result<i64, DbErr> {
        let record = whole_file::ActiveModel {
            filename: Set(filename.to_string()),
            file_hash: Set(file_hash.to_hex()),
            file_size: Set(file_size as i64),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(record.id)
    }

    pub async fn list_whole_files(&self) -> Result<Vec<whole_file::Model>, DbErr> {
        whole_file::Entity::find()
            .order_by_asc(whole_file::Column::Id)
            .all(&self.db)
            .await
    }

    pub async fn get_whole_file(&self, id: i64) -> Result<Option<whole_file::Model>, DbErr> {
        whole_file::Entity::find_by_id(id).one(&self.db).await
    }

    /// Read-only dump of all three record kinds.
    pub async fn dump(&self) -> Result<CatalogDump, DbErr> {
        Ok(CatalogDump {
            files: self.list_files().await?,
            chunks: file_chunk::Entity::find()
                .order_by_asc(file_chunk::Column::Id)
                .all(&self.db)
                .await?,
            files_nodfs: self.list_whole_files().await?,
        })
    }
}
