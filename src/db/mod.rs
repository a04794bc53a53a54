//! Database module for SQLite persistence using SeaORM

pub mod entities;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::path::Path;

/// Initialize database connection and create tables
pub async fn init_database(db_path: &Path) -> Result<DatabaseConnection, DbErr> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
    tracing::info!("Connecting to database: {}", db_url);

    let db = Database::connect(&db_url).await?;

    // Create tables
    create_tables(&db).await?;

    Ok(db)
}

/// Create all tables if they don't exist
pub async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Chunked-mode file records
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            file_hash TEXT NOT NULL,
            total_chunks INTEGER NOT NULL
        )
        "#
        .to_string(),
    ))
    .await?;

    // Chunk records, one per (file, sequence)
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id INTEGER NOT NULL,
            chunk_order INTEGER NOT NULL,
            chunk_hash TEXT NOT NULL,
            FOREIGN KEY (file_id) REFERENCES files(id)
        )
        "#
        .to_string(),
    ))
    .await?;

    // Index for chunk-to-file lookups
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id)"#.to_string(),
    ))
    .await?;

    // Direct-mode (whole file) records
    db.execute(Statement::from_string(
        db.get_database_backend(),
        r#"
        CREATE TABLE IF NOT EXISTS files_nodfs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            file_hash TEXT NOT NULL,
            file_size INTEGER NOT NULL
        )
        "#
        .to_string(),
    ))
    .await?;

    tracing::info!("Database tables initialized");
    Ok(())
}
