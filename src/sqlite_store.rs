//! SQLite-backed [`VectorStore`].
//!
//! Chunks live in the `chunks` table. When an embedding provider is
//! configured, each chunk's vector is stored as a BLOB next to it and
//! queries rank by cosine similarity (brute force over the filtered rows).
//! Without a provider, or for rows written before one was configured,
//! similarity is lexical overlap, the same measure the in-memory store uses.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use smartdoc_core::models::{Chunk, RetrievalFilter, RetrievedChunk};
use smartdoc_core::store::{lexical_similarity, rank_candidates, VectorStore};

use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, vec_to_blob, EmbeddingProvider};

pub struct SqliteStore {
    pool: SqlitePool,
    embedder: Option<Box<dyn EmbeddingProvider>>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, embedder: Option<Box<dyn EmbeddingProvider>>) -> Self {
        Self { pool, embedder }
    }
}

pub(crate) fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let source_type: String = row.get("source_type");
    let category: String = row.get("category");
    let metadata_json: String = row.get("metadata_json");
    let metadata = match serde_json::from_str(&metadata_json) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };

    Ok(Chunk {
        id: row.get("id"),
        content: row.get("content"),
        source: row.get("source"),
        source_type: source_type.parse()?,
        category: category.parse()?,
        location: row.get("location"),
        metadata,
        created_at: from_ts(row.get("created_at")),
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn add(&self, chunk: &Chunk) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM chunks WHERE id = ?")
            .bind(&chunk.id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            return Ok(false);
        }

        let (blob, model) = match &self.embedder {
            Some(embedder) => {
                let vector = embed_query(embedder.as_ref(), &chunk.content)
                    .await
                    .with_context(|| format!("Failed to embed chunk {}", chunk.id))?;
                (Some(vec_to_blob(&vector)), Some(embedder.model_name().to_string()))
            }
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO chunks (id, source, source_type, category, location,
                                          content, metadata_json, created_at,
                                          embedding, embedding_model)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.source)
        .bind(chunk.source_type.as_str())
        .bind(chunk.category.as_str())
        .bind(&chunk.location)
        .bind(&chunk.content)
        .bind(serde_json::Value::Object(chunk.metadata.clone()).to_string())
        .bind(chunk.created_at.timestamp())
        .bind(blob)
        .bind(model)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn query(
        &self,
        text: &str,
        top_k: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<RetrievedChunk>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, source, source_type, category, location, content, metadata_json, \
             created_at, embedding FROM chunks WHERE 1 = 1",
        );
        if let Some(ref source) = filter.source {
            qb.push(" AND source = ").push_bind(source.clone());
        }
        if let Some(source_type) = filter.source_type {
            qb.push(" AND source_type = ").push_bind(source_type.as_str());
        }
        if let Some(category) = filter.category {
            qb.push(" AND category = ").push_bind(category.as_str());
        }
        qb.push(" ORDER BY created_at ASC, id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;

        let query_vec = match &self.embedder {
            Some(embedder) => Some(embed_query(embedder.as_ref(), text).await?),
            None => None,
        };

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = row_to_chunk(row)?;
            let blob: Option<Vec<u8>> = row.get("embedding");
            let similarity = match (&query_vec, blob) {
                (Some(q), Some(blob)) => cosine_similarity(q, &blob_to_vec(&blob)) as f64,
                _ => lexical_similarity(text, &chunk.content),
            };
            scored.push((chunk, similarity));
        }

        Ok(rank_candidates(scored, top_k))
    }

    async fn delete_source(&self, source: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query(
            "SELECT id, source, source_type, category, location, content, metadata_json, created_at FROM chunks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_chunk).transpose()
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }
}
