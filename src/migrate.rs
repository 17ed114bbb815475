//! Schema for the registry tables and the chunk store.
//!
//! Every statement is `IF NOT EXISTS`, so running `smartdoc init` twice is
//! harmless.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Sources, keyed by canonical path or URL
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_type TEXT NOT NULL,
            source_path TEXT NOT NULL UNIQUE,
            indexed_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            size_bytes INTEGER,
            status TEXT NOT NULL DEFAULT 'processing',
            metadata_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Vision analyses, one per (fingerprint, normalized query context)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schematic_cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fingerprint TEXT NOT NULL,
            query_context TEXT NOT NULL,
            source_path TEXT NOT NULL,
            location TEXT,
            last_query TEXT NOT NULL,
            analysis TEXT NOT NULL,
            confidence REAL NOT NULL,
            analyzed_at INTEGER NOT NULL,
            UNIQUE(fingerprint, query_context)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only processing log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processing_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_path TEXT NOT NULL,
            step TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT NOT NULL DEFAULT '',
            details_json TEXT NOT NULL DEFAULT 'null',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Chunks; the embedding is NULL when no provider is configured
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            source_type TEXT NOT NULL,
            category TEXT NOT NULL,
            location TEXT,
            content TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            embedding BLOB,
            embedding_model TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_category ON chunks(category)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_cache_source ON schematic_cache(source_path)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_logs_source ON processing_logs(source_path, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
