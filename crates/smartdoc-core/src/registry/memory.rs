//! In-memory [`SourceRegistry`] for tests and embedded use.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::cache::CacheKey;
use crate::models::{
    CacheEntry, LogEntry, NewSource, RegistryStats, Source, SourceStatus, SourceType,
    SourceTypeCount,
};

use super::SourceRegistry;

/// Registry state behind `std::sync::RwLock`s. Source ids are assigned
/// from a counter, mirroring an autoincrement primary key.
pub struct InMemoryRegistry {
    sources: RwLock<Vec<Source>>,
    cache: RwLock<HashMap<CacheKey, CacheEntry>>,
    logs: RwLock<Vec<LogEntry>>,
    next_id: RwLock<i64>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            cache: RwLock::new(HashMap::new()),
            logs: RwLock::new(Vec::new()),
            next_id: RwLock::new(1),
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceRegistry for InMemoryRegistry {
    async fn upsert_source(&self, new: &NewSource) -> Result<Source> {
        let now = Utc::now();
        let mut sources = self.sources.write().unwrap();

        if let Some(existing) = sources.iter_mut().find(|s| s.path == new.path) {
            existing.source_type = new.source_type;
            existing.size_bytes = new.size_bytes;
            existing.metadata = new.metadata.clone();
            existing.status = SourceStatus::Processing;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let mut next_id = self.next_id.write().unwrap();
        let source = Source {
            id: *next_id,
            source_type: new.source_type,
            path: new.path.clone(),
            indexed_at: now,
            updated_at: now,
            size_bytes: new.size_bytes,
            status: SourceStatus::Processing,
            metadata: new.metadata.clone(),
        };
        *next_id += 1;
        sources.push(source.clone());
        Ok(source)
    }

    async fn get_source(&self, path: &str) -> Result<Option<Source>> {
        let sources = self.sources.read().unwrap();
        Ok(sources.iter().find(|s| s.path == path).cloned())
    }

    async fn list_sources(&self, source_type: Option<SourceType>) -> Result<Vec<Source>> {
        let sources = self.sources.read().unwrap();
        let mut out: Vec<Source> = sources
            .iter()
            .filter(|s| source_type.map_or(true, |t| s.source_type == t))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn update_status(
        &self,
        path: &str,
        status: SourceStatus,
        metadata: Option<Value>,
    ) -> Result<bool> {
        let mut sources = self.sources.write().unwrap();
        match sources.iter_mut().find(|s| s.path == path) {
            Some(s) => {
                s.status = status;
                if let Some(m) = metadata {
                    s.metadata = m;
                }
                s.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_source(&self, path: &str) -> Result<bool> {
        let mut sources = self.sources.write().unwrap();
        let before = sources.len();
        sources.retain(|s| s.path != path);
        self.cache.write().unwrap().retain(|_, e| e.source != path);
        self.logs.write().unwrap().retain(|l| l.source != path);
        Ok(sources.len() < before)
    }

    async fn get_cache(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.cache.read().unwrap().get(key).cloned())
    }

    async fn put_cache(&self, entry: &CacheEntry) -> Result<()> {
        self.cache
            .write()
            .unwrap()
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn cache_entries_for(&self, source: &str) -> Result<Vec<CacheEntry>> {
        let cache = self.cache.read().unwrap();
        let mut out: Vec<CacheEntry> = cache
            .values()
            .filter(|e| e.source == source)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.analyzed_at.cmp(&a.analyzed_at));
        Ok(out)
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<()> {
        self.logs.write().unwrap().push(entry.clone());
        Ok(())
    }

    async fn logs_for(&self, source: &str) -> Result<Vec<LogEntry>> {
        let logs = self.logs.read().unwrap();
        Ok(logs.iter().filter(|l| l.source == source).cloned().collect())
    }

    async fn stats(&self) -> Result<RegistryStats> {
        let sources = self.sources.read().unwrap();
        let mut by_type: Vec<SourceTypeCount> = Vec::new();
        for s in sources.iter() {
            let size = s.size_bytes.unwrap_or(0);
            match by_type.iter_mut().find(|c| c.source_type == s.source_type) {
                Some(c) => {
                    c.count += 1;
                    c.total_bytes += size;
                }
                None => by_type.push(SourceTypeCount {
                    source_type: s.source_type,
                    count: 1,
                    total_bytes: size,
                }),
            }
        }
        by_type.sort_by(|a, b| a.source_type.as_str().cmp(b.source_type.as_str()));

        Ok(RegistryStats {
            total_sources: sources.len() as i64,
            by_type,
            cached_analyses: self.cache.read().unwrap().len() as i64,
            log_entries: self.logs.read().unwrap().len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogStatus;
    use serde_json::json;

    fn new_source(path: &str, source_type: SourceType, size: i64) -> NewSource {
        NewSource {
            source_type,
            path: path.to_string(),
            size_bytes: Some(size),
            metadata: json!({}),
        }
    }

    fn entry(source: &str, fp: &str, query: &str) -> CacheEntry {
        CacheEntry {
            key: CacheKey::new(fp, query),
            source: source.to_string(),
            location: Some("4".to_string()),
            last_query: query.to_string(),
            analysis: "MOSI: D11".to_string(),
            confidence: 0.75,
            analyzed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_identity() {
        let reg = InMemoryRegistry::new();
        let first = reg
            .upsert_source(&new_source("nano.pdf", SourceType::Document, 10))
            .await
            .unwrap();
        reg.update_status("nano.pdf", SourceStatus::Success, Some(json!({"pages": 12})))
            .await
            .unwrap();
        assert_eq!(
            reg.get_source("nano.pdf").await.unwrap().unwrap().metadata["pages"],
            12
        );
        let second = reg
            .upsert_source(&new_source("nano.pdf", SourceType::Document, 20))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.size_bytes, Some(20));
        assert_eq!(second.status, SourceStatus::Processing);
        assert_eq!(reg.list_sources(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_overwrites_by_key() {
        let reg = InMemoryRegistry::new();
        reg.put_cache(&entry("nano.pdf", "fp", "SPI pins")).await.unwrap();
        let mut newer = entry("nano.pdf", "fp", "spi  PINS");
        newer.analysis = "MOSI: D11\nMISO: D12".to_string();
        reg.put_cache(&newer).await.unwrap();

        let got = reg
            .get_cache(&CacheKey::new("fp", "spi pins"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.analysis, "MOSI: D11\nMISO: D12");
        assert_eq!(reg.cache_entries_for("nano.pdf").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let reg = InMemoryRegistry::new();
        reg.upsert_source(&new_source("nano.pdf", SourceType::Document, 10))
            .await
            .unwrap();
        reg.upsert_source(&new_source("uno.pdf", SourceType::Document, 5))
            .await
            .unwrap();
        reg.put_cache(&entry("nano.pdf", "fp", "spi pins")).await.unwrap();
        reg.put_cache(&entry("uno.pdf", "fp2", "spi pins")).await.unwrap();
        reg.append_log(&LogEntry::new("nano.pdf", "ingest", LogStatus::Success, "ok"))
            .await
            .unwrap();

        assert!(reg.delete_source("nano.pdf").await.unwrap());
        assert!(!reg.delete_source("nano.pdf").await.unwrap());
        assert!(reg.logs_for("nano.pdf").await.unwrap().is_empty());
        assert!(reg.cache_entries_for("nano.pdf").await.unwrap().is_empty());

        let stats = reg.stats().await.unwrap();
        assert_eq!(stats.total_sources, 1);
        assert_eq!(stats.cached_analyses, 1);
        assert_eq!(stats.log_entries, 0);
    }

    #[tokio::test]
    async fn test_delete_unregistered_source_clears_cache_and_logs() {
        let reg = InMemoryRegistry::new();
        reg.put_cache(&entry("nano.pdf", "fp", "spi pins")).await.unwrap();
        reg.append_log(&LogEntry::new(
            "nano.pdf",
            "schematic_reprocess",
            LogStatus::Success,
            "ok",
        ))
        .await
        .unwrap();

        assert!(!reg.delete_source("nano.pdf").await.unwrap());
        assert!(reg.cache_entries_for("nano.pdf").await.unwrap().is_empty());
        assert!(reg.logs_for("nano.pdf").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_by_type() {
        let reg = InMemoryRegistry::new();
        reg.upsert_source(&new_source("a.pdf", SourceType::Document, 10))
            .await
            .unwrap();
        reg.upsert_source(&new_source("b.pdf", SourceType::Document, 30))
            .await
            .unwrap();
        reg.upsert_source(&new_source("https://example.com", SourceType::Webpage, 0))
            .await
            .unwrap();

        let stats = reg.stats().await.unwrap();
        assert_eq!(stats.total_sources, 3);
        let docs = stats
            .by_type
            .iter()
            .find(|c| c.source_type == SourceType::Document)
            .unwrap();
        assert_eq!(docs.count, 2);
        assert_eq!(docs.total_bytes, 40);
        assert_eq!(
            reg.list_sources(Some(SourceType::Webpage)).await.unwrap().len(),
            1
        );
    }
}
