//! Database access for abr-meta
//!
//! SQLite holds one row per webhook request: the raw payload, its status
//! and, once resolved, the canonical metadata as JSON.

pub mod requests;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create tables if they don't exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS requests (
            id TEXT PRIMARY KEY,
            received_at TEXT NOT NULL,
            name TEXT,
            source_url TEXT,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            metadata TEXT,
            error TEXT,
            resolved_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_received_at ON requests(received_at)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (requests)");

    Ok(())
}
