//! Core data models shared by the registry, the vector store, and the
//! query pipeline.
//!
//! Sources, chunks, cache entries, and processing-log entries are plain
//! records. Ownership is split: the [`SourceRegistry`](crate::registry::SourceRegistry)
//! owns sources, cache entries, and logs; the
//! [`VectorStore`](crate::store::VectorStore) owns chunks.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::CacheKey;

/// Kind of ingested source. Closed set; ingestion backends only differ in
/// how they produce chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Document,
    Repository,
    Webpage,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Document => "document",
            SourceType::Repository => "repository",
            SourceType::Webpage => "webpage",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = anyhow::Error;

    /// Accepts the canonical names plus the short aliases used on the
    /// command line (`pdf`, `github`, `web`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" | "pdf" => Ok(SourceType::Document),
            "repository" | "repo" | "github" => Ok(SourceType::Repository),
            "webpage" | "web" => Ok(SourceType::Webpage),
            other => bail!(
                "Unknown source type: '{}'. Use document, repository, or webpage.",
                other
            ),
        }
    }
}

/// What a chunk's content represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Text,
    Schematic,
    Code,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Text => "text",
            ContentCategory::Schematic => "schematic",
            ContentCategory::Code => "code",
        }
    }
}

impl FromStr for ContentCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentCategory::Text),
            "schematic" => Ok(ContentCategory::Schematic),
            "code" => Ok(ContentCategory::Code),
            other => bail!("Unknown content category: '{}'", other),
        }
    }
}

/// Ingestion status of a [`Source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Processing,
    Success,
    Failed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Processing => "processing",
            SourceStatus::Success => "success",
            SourceStatus::Failed => "failed",
        }
    }
}

impl FromStr for SourceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(SourceStatus::Processing),
            "success" => Ok(SourceStatus::Success),
            "failed" => Ok(SourceStatus::Failed),
            other => bail!("Unknown source status: '{}'", other),
        }
    }
}

/// Outcome recorded by a processing-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Started,
    Success,
    Warning,
    Failed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Started => "started",
            LogStatus::Success => "success",
            LogStatus::Warning => "warning",
            LogStatus::Failed => "failed",
        }
    }
}

impl FromStr for LogStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(LogStatus::Started),
            "success" => Ok(LogStatus::Success),
            "warning" => Ok(LogStatus::Warning),
            "failed" => Ok(LogStatus::Failed),
            other => bail!("Unknown log status: '{}'", other),
        }
    }
}

/// Well-known chunk metadata keys.
pub mod meta {
    /// Path of the extracted image, relative to the workspace image directory.
    pub const IMAGE_REF: &str = "image_ref";
    /// Fingerprint of the image the chunk was derived from.
    pub const IMAGE_HASH: &str = "image_hash";
    /// Confidence recorded when the analysis was produced.
    pub const CONFIDENCE: &str = "confidence";
    /// Raw query context a reprocessed analysis answered.
    pub const QUERY_CONTEXT: &str = "query_context";
    pub const REPROCESSED: &str = "reprocessed";
    pub const PARENT_CHUNK: &str = "parent_chunk_id";
    pub const PIN_MAPPINGS: &str = "pin_mappings";
    pub const COMPONENTS: &str = "components";
    pub const TITLE: &str = "title";
}

/// An indexed unit of content. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    /// Canonical path or URL of the owning source.
    pub source: String,
    pub source_type: SourceType,
    pub category: ContentCategory,
    /// Page number, file path, or section, depending on the source type.
    pub location: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(Value::as_f64)
    }

    /// Image reference for schematic chunks, if the producer recorded one.
    pub fn image_ref(&self) -> Option<&str> {
        self.metadata_str(meta::IMAGE_REF)
            .filter(|r| !r.trim().is_empty())
    }

    pub fn is_schematic(&self) -> bool {
        self.category == ContentCategory::Schematic
    }
}

/// Optional narrowing applied to a vector-store query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalFilter {
    pub source: Option<String>,
    pub source_type: Option<SourceType>,
    pub category: Option<ContentCategory>,
}

impl RetrievalFilter {
    pub fn source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: ContentCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(ref s) = self.source {
            if &chunk.source != s {
                return false;
            }
        }
        if let Some(t) = self.source_type {
            if chunk.source_type != t {
                return false;
            }
        }
        if let Some(c) = self.category {
            if chunk.category != c {
                return false;
            }
        }
        true
    }
}

/// A chunk returned by similarity search, with its position in the ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// Similarity in `[0.0, 1.0]`; higher is closer.
    pub similarity: f64,
    /// Zero-based rank in the result list.
    pub rank: usize,
}

impl RetrievedChunk {
    pub fn new(chunk: Chunk, similarity: f64, rank: usize) -> Self {
        Self {
            chunk,
            similarity: clamp_unit(similarity),
            rank,
        }
    }

    /// Build from a distance-based backend: `similarity = 1 - distance`.
    pub fn from_distance(chunk: Chunk, distance: f64, rank: usize) -> Self {
        Self::new(chunk, 1.0 - distance, rank)
    }
}

/// Clamp to `[0.0, 1.0]`, mapping NaN to `0.0`.
pub fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// One ingested document, repository, or web page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub id: i64,
    pub source_type: SourceType,
    pub path: String,
    pub indexed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub size_bytes: Option<i64>,
    pub status: SourceStatus,
    pub metadata: Value,
}

/// Fields supplied when registering a source.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub source_type: SourceType,
    pub path: String,
    pub size_bytes: Option<i64>,
    pub metadata: Value,
}

/// A cached vision analysis. At most one per [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub source: String,
    pub location: Option<String>,
    /// The query text as the caller wrote it, before normalization.
    pub last_query: String,
    pub analysis: String,
    pub confidence: f64,
    pub analyzed_at: DateTime<Utc>,
}

/// Append-only diagnostic record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub source: String,
    pub step: String,
    pub status: LogStatus,
    pub message: String,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(
        source: impl Into<String>,
        step: impl Into<String>,
        status: LogStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            step: step.into(),
            status,
            message: message.into(),
            details: Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Per-type source counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTypeCount {
    pub source_type: SourceType,
    pub count: i64,
    pub total_bytes: i64,
}

/// Registry-wide counts reported by `smartdoc stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistryStats {
    pub total_sources: i64,
    pub by_type: Vec<SourceTypeCount>,
    pub cached_analyses: i64,
    pub log_entries: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, category: ContentCategory) -> Chunk {
        Chunk {
            id: "c1".to_string(),
            content: "text".to_string(),
            source: source.to_string(),
            source_type: SourceType::Document,
            category,
            location: Some("3".to_string()),
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_source_type_aliases() {
        assert_eq!("pdf".parse::<SourceType>().unwrap(), SourceType::Document);
        assert_eq!("GitHub".parse::<SourceType>().unwrap(), SourceType::Repository);
        assert_eq!("web".parse::<SourceType>().unwrap(), SourceType::Webpage);
        assert!("ftp".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_filter_matches() {
        let c = chunk("a.pdf", ContentCategory::Schematic);
        assert!(RetrievalFilter::default().matches(&c));
        assert!(RetrievalFilter::source("a.pdf").matches(&c));
        assert!(!RetrievalFilter::source("b.pdf").matches(&c));
        assert!(!RetrievalFilter::default()
            .with_category(ContentCategory::Text)
            .matches(&c));
    }

    #[test]
    fn test_distance_conversion_clamps() {
        let c = chunk("a.pdf", ContentCategory::Text);
        assert_eq!(RetrievedChunk::from_distance(c.clone(), 1.7, 0).similarity, 0.0);
        assert_eq!(RetrievedChunk::from_distance(c.clone(), -0.2, 0).similarity, 1.0);
        assert!((RetrievedChunk::from_distance(c, 0.25, 0).similarity - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_image_ref_ignores_blank() {
        let mut c = chunk("a.pdf", ContentCategory::Schematic);
        assert!(c.image_ref().is_none());
        c.metadata.insert(meta::IMAGE_REF.into(), Value::from("  "));
        assert!(c.image_ref().is_none());
        c.metadata.insert(meta::IMAGE_REF.into(), Value::from("a/p4.png"));
        assert_eq!(c.image_ref(), Some("a/p4.png"));
    }
}
