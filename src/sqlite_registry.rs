//! SQLite-backed [`SourceRegistry`].
//!
//! Tables: `sources`, `schematic_cache`, `processing_logs` (see
//! [`migrate`](crate::migrate)). Timestamps are Unix seconds.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use smartdoc_core::cache::CacheKey;
use smartdoc_core::models::{
    CacheEntry, LogEntry, NewSource, RegistryStats, Source, SourceStatus, SourceType,
    SourceTypeCount,
};
use smartdoc_core::registry::SourceRegistry;

use crate::sqlite_store::from_ts;

pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_json(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or(Value::Null)
}

fn row_to_source(row: &SqliteRow) -> Result<Source> {
    let source_type: String = row.get("source_type");
    let status: String = row.get("status");
    let metadata_json: String = row.get("metadata_json");

    Ok(Source {
        id: row.get("id"),
        source_type: source_type.parse()?,
        path: row.get("source_path"),
        indexed_at: from_ts(row.get("indexed_at")),
        updated_at: from_ts(row.get("updated_at")),
        size_bytes: row.get("size_bytes"),
        status: status.parse()?,
        metadata: parse_json(&metadata_json),
    })
}

fn row_to_cache_entry(row: &SqliteRow) -> CacheEntry {
    CacheEntry {
        key: CacheKey {
            fingerprint: row.get("fingerprint"),
            query_context: row.get("query_context"),
        },
        source: row.get("source_path"),
        location: row.get("location"),
        last_query: row.get("last_query"),
        analysis: row.get("analysis"),
        confidence: row.get("confidence"),
        analyzed_at: from_ts(row.get("analyzed_at")),
    }
}

fn row_to_log(row: &SqliteRow) -> Result<LogEntry> {
    let status: String = row.get("status");
    let details_json: String = row.get("details_json");

    Ok(LogEntry {
        source: row.get("source_path"),
        step: row.get("step"),
        status: status.parse()?,
        message: row.get("message"),
        details: parse_json(&details_json),
        timestamp: from_ts(row.get("created_at")),
    })
}

const SOURCE_COLUMNS: &str =
    "id, source_type, source_path, indexed_at, updated_at, size_bytes, status, metadata_json";

const CACHE_COLUMNS: &str =
    "fingerprint, query_context, source_path, location, last_query, analysis, confidence, analyzed_at";

#[async_trait]
impl SourceRegistry for SqliteRegistry {
    async fn upsert_source(&self, source: &NewSource) -> Result<Source> {
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO sources (source_type, source_path, indexed_at, updated_at,
                                 size_bytes, status, metadata_json)
            VALUES (?, ?, ?, ?, ?, 'processing', ?)
            ON CONFLICT(source_path) DO UPDATE SET
                source_type = excluded.source_type,
                updated_at = excluded.updated_at,
                size_bytes = excluded.size_bytes,
                status = 'processing',
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(source.source_type.as_str())
        .bind(&source.path)
        .bind(now)
        .bind(now)
        .bind(source.size_bytes)
        .bind(source.metadata.to_string())
        .execute(&self.pool)
        .await?;

        self.get_source(&source.path)
            .await?
            .ok_or_else(|| anyhow::anyhow!("source vanished after upsert: {}", source.path))
    }

    async fn get_source(&self, path: &str) -> Result<Option<Source>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sources WHERE source_path = ?",
            SOURCE_COLUMNS
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_source).transpose()
    }

    async fn list_sources(&self, source_type: Option<SourceType>) -> Result<Vec<Source>> {
        let rows = match source_type {
            Some(t) => {
                sqlx::query(&format!(
                    "SELECT {} FROM sources WHERE source_type = ? ORDER BY indexed_at DESC, id DESC",
                    SOURCE_COLUMNS
                ))
                .bind(t.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM sources ORDER BY indexed_at DESC, id DESC",
                    SOURCE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_source).collect()
    }

    async fn update_status(
        &self,
        path: &str,
        status: SourceStatus,
        metadata: Option<Value>,
    ) -> Result<bool> {
        let now = Utc::now().timestamp();
        let result = match metadata {
            Some(m) => {
                sqlx::query(
                    "UPDATE sources SET status = ?, metadata_json = ?, updated_at = ? WHERE source_path = ?",
                )
                .bind(status.as_str())
                .bind(m.to_string())
                .bind(now)
                .bind(path)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query("UPDATE sources SET status = ?, updated_at = ? WHERE source_path = ?")
                    .bind(status.as_str())
                    .bind(now)
                    .bind(path)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn delete_source(&self, path: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM schematic_cache WHERE source_path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM processing_logs WHERE source_path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM sources WHERE source_path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn get_cache(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM schematic_cache WHERE fingerprint = ? AND query_context = ?",
            CACHE_COLUMNS
        ))
        .bind(&key.fingerprint)
        .bind(&key.query_context)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_cache_entry))
    }

    async fn put_cache(&self, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO schematic_cache (fingerprint, query_context, source_path, location,
                                         last_query, analysis, confidence, analyzed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(fingerprint, query_context) DO UPDATE SET
                source_path = excluded.source_path,
                location = excluded.location,
                last_query = excluded.last_query,
                analysis = excluded.analysis,
                confidence = excluded.confidence,
                analyzed_at = excluded.analyzed_at
            "#,
        )
        .bind(&entry.key.fingerprint)
        .bind(&entry.key.query_context)
        .bind(&entry.source)
        .bind(&entry.location)
        .bind(&entry.last_query)
        .bind(&entry.analysis)
        .bind(entry.confidence)
        .bind(entry.analyzed_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cache_entries_for(&self, source: &str) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM schematic_cache WHERE source_path = ? ORDER BY analyzed_at DESC, id DESC",
            CACHE_COLUMNS
        ))
        .bind(source)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_cache_entry).collect())
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processing_logs (source_path, step, status, message, details_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.source)
        .bind(&entry.step)
        .bind(entry.status.as_str())
        .bind(&entry.message)
        .bind(entry.details.to_string())
        .bind(entry.timestamp.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn logs_for(&self, source: &str) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT source_path, step, status, message, details_json, created_at
            FROM processing_logs
            WHERE source_path = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_log).collect()
    }

    async fn stats(&self) -> Result<RegistryStats> {
        let total_sources: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT source_type, COUNT(*) AS n, COALESCE(SUM(size_bytes), 0) AS total_bytes
            FROM sources
            GROUP BY source_type
            ORDER BY source_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_type = Vec::with_capacity(rows.len());
        for row in &rows {
            let source_type: String = row.get("source_type");
            by_type.push(SourceTypeCount {
                source_type: source_type.parse()?,
                count: row.get("n"),
                total_bytes: row.get("total_bytes"),
            });
        }

        let cached_analyses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schematic_cache")
            .fetch_one(&self.pool)
            .await?;
        let log_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processing_logs")
            .fetch_one(&self.pool)
            .await?;

        Ok(RegistryStats {
            total_sources,
            by_type,
            cached_analyses,
            log_entries,
        })
    }
}
