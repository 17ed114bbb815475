//! Source registry abstraction.
//!
//! The registry is the relational side of SmartDoc: which sources exist,
//! which vision analyses are cached, and an append-only processing log.
//! Chunks are owned by the [`VectorStore`](crate::store::VectorStore).
//!
//! Sources are addressed by their canonical path or URL, which is unique.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::cache::CacheKey;
use crate::models::{
    CacheEntry, LogEntry, NewSource, RegistryStats, Source, SourceStatus, SourceType,
};

#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// Register a source, or refresh size, metadata, and `updated_at` if the
    /// path is already known. Status is reset to `processing`.
    async fn upsert_source(&self, source: &NewSource) -> Result<Source>;

    async fn get_source(&self, path: &str) -> Result<Option<Source>>;

    /// All sources, optionally of one type, most recently indexed first.
    async fn list_sources(&self, source_type: Option<SourceType>) -> Result<Vec<Source>>;

    /// Set the status of a known source, replacing its metadata when given.
    /// Returns `false` for unknown paths.
    async fn update_status(
        &self,
        path: &str,
        status: SourceStatus,
        metadata: Option<Value>,
    ) -> Result<bool>;

    /// Remove a source together with its cache entries and log entries.
    /// Cache entries and logs recorded under `path` are removed even when
    /// no source row exists. Returns whether a source row was deleted.
    async fn delete_source(&self, path: &str) -> Result<bool>;

    async fn get_cache(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Insert or replace the entry stored under `entry.key`.
    async fn put_cache(&self, entry: &CacheEntry) -> Result<()>;

    /// Cached analyses of one source, newest first.
    async fn cache_entries_for(&self, source: &str) -> Result<Vec<CacheEntry>>;

    async fn append_log(&self, entry: &LogEntry) -> Result<()>;

    /// Log entries of one source, oldest first.
    async fn logs_for(&self, source: &str) -> Result<Vec<LogEntry>>;

    async fn stats(&self) -> Result<RegistryStats>;
}
