//! `smartdoc import`: load chunks produced by an external ingestion pipeline.
//!
//! Input is JSON Lines, one chunk per line:
//!
//! ```json
//! {"source": "nano-r4.pdf", "source_type": "pdf", "location": "4",
//!  "category": "schematic", "content": "Figure 4: header",
//!  "metadata": {"image_ref": "nano-r4/p4.png"}}
//! ```
//!
//! `id` is optional; without it the id is derived from source, location,
//! and content, so importing the same file twice adds nothing. Each source
//! is registered as `processing`, its chunks are added, and it is marked
//! `success` with chunk counts (or `failed` if the store rejects a chunk).

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::io::BufRead;
use std::path::Path;
use uuid::Uuid;

use smartdoc_core::models::{
    Chunk, ContentCategory, LogEntry, LogStatus, NewSource, SourceStatus, SourceType,
};

use crate::workspace::Workspace;

const STEP: &str = "import";

#[derive(Debug, Deserialize)]
pub struct ChunkRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    /// `document`, `repository`, `webpage`, or an alias (`pdf`, `github`, `web`).
    pub source_type: String,
    #[serde(default = "default_category")]
    pub category: ContentCategory,
    #[serde(default)]
    pub location: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_category() -> ContentCategory {
    ContentCategory::Text
}

impl ChunkRecord {
    fn into_chunk(self) -> Result<Chunk> {
        if self.source.trim().is_empty() {
            bail!("source is empty");
        }
        if self.content.trim().is_empty() {
            bail!("content is empty");
        }
        let source_type: SourceType = self.source_type.parse()?;
        let id = match self.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => derived_id(&self.source, self.location.as_deref(), &self.content),
        };

        Ok(Chunk {
            id,
            content: self.content,
            source: self.source,
            source_type,
            category: self.category,
            location: self.location,
            metadata: self.metadata,
            created_at: Utc::now(),
        })
    }
}

fn derived_id(source: &str, location: Option<&str>, content: &str) -> String {
    let name = format!("{}\n{}\n{}", source, location.unwrap_or(""), content);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Per-source outcome of an import.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImport {
    pub source: String,
    pub chunks: usize,
    pub added: usize,
}

/// Parse every line first, so a malformed file registers nothing.
pub fn parse_records(reader: impl BufRead) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ChunkRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid chunk record on line {}", idx + 1))?;
        let chunk = record
            .into_chunk()
            .with_context(|| format!("Invalid chunk record on line {}", idx + 1))?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Register sources and add chunks, grouped by source in first-seen order.
pub async fn import_chunks(ws: &Workspace, chunks: Vec<Chunk>) -> Result<Vec<SourceImport>> {
    let mut groups: Vec<(String, SourceType, Vec<Chunk>)> = Vec::new();
    for chunk in chunks {
        match groups.iter().position(|(s, _, _)| *s == chunk.source) {
            Some(i) => groups[i].2.push(chunk),
            None => groups.push((chunk.source.clone(), chunk.source_type, vec![chunk])),
        }
    }

    let mut summary = Vec::with_capacity(groups.len());
    for (source, source_type, group) in groups {
        let size: usize = group.iter().map(|c| c.content.len()).sum();
        ws.registry
            .upsert_source(&NewSource {
                source_type,
                path: source.clone(),
                size_bytes: Some(size as i64),
                metadata: json!({}),
            })
            .await?;

        let mut added = 0;
        for chunk in &group {
            match ws.store.add(chunk).await {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => {
                    let message = format!("{:#}", e);
                    ws.registry
                        .update_status(&source, SourceStatus::Failed, Some(json!({ "error": message })))
                        .await?;
                    ws.registry
                        .append_log(
                            &LogEntry::new(&source, STEP, LogStatus::Failed, "Import failed")
                                .with_details(json!({ "chunk_id": chunk.id, "error": message })),
                        )
                        .await?;
                    return Err(e.context(format!("Failed to import chunk {}", chunk.id)));
                }
            }
        }

        let schematics = group
            .iter()
            .filter(|c| c.category == ContentCategory::Schematic)
            .count();
        let counts = json!({
            "chunks": group.len(),
            "schematics": schematics,
            "added": added,
        });
        ws.registry
            .update_status(&source, SourceStatus::Success, Some(counts.clone()))
            .await?;
        ws.registry
            .append_log(
                &LogEntry::new(
                    &source,
                    STEP,
                    LogStatus::Success,
                    format!("Imported {} chunks ({} new)", group.len(), added),
                )
                .with_details(counts),
            )
            .await?;

        tracing::info!(source = %source, chunks = group.len(), added, "imported source");
        summary.push(SourceImport {
            source,
            chunks: group.len(),
            added,
        });
    }

    Ok(summary)
}

pub async fn run_import(ws: &Workspace, path: &Path) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let chunks = parse_records(std::io::BufReader::new(file))?;
    let summary = import_chunks(ws, chunks).await?;

    println!("import {}", path.display());
    for s in &summary {
        println!("  {}: {} chunks ({} new)", s.source, s.chunks, s.added);
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartdoc_core::models::meta;
    use smartdoc_core::policy::DefaultPersistencePolicy;
    use smartdoc_core::registry::memory::InMemoryRegistry;
    use smartdoc_core::store::memory::InMemoryStore;
    use smartdoc_core::vision::InMemoryImageSource;
    use std::sync::Arc;

    use crate::gemini::DisabledVision;
    use crate::workspace::Settings;

    fn workspace() -> Workspace {
        Workspace {
            settings: Settings::default(),
            store: Arc::new(InMemoryStore::new()),
            registry: Arc::new(InMemoryRegistry::new()),
            vision: Arc::new(DisabledVision),
            images: Arc::new(InMemoryImageSource::new()),
            policy: Arc::new(DefaultPersistencePolicy::default()),
        }
    }

    const JSONL: &str = r#"
{"source": "nano.pdf", "source_type": "pdf", "location": "1", "content": "Board overview"}
{"source": "nano.pdf", "source_type": "pdf", "location": "4", "category": "schematic", "content": "Figure 4: header", "metadata": {"image_ref": "nano/p4.png"}}
{"id": "readme", "source": "arduino/core", "source_type": "github", "location": "README.md", "category": "code", "content": "Core sources"}
"#;

    #[test]
    fn test_parse_records() {
        let chunks = parse_records(JSONL.as_bytes()).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].source_type, SourceType::Document);
        assert_eq!(chunks[0].category, ContentCategory::Text);
        assert_eq!(chunks[1].image_ref(), Some("nano/p4.png"));
        assert_eq!(chunks[2].id, "readme");
        assert_eq!(chunks[2].source_type, SourceType::Repository);

        let again = parse_records(JSONL.as_bytes()).unwrap();
        assert_eq!(chunks[0].id, again[0].id);
        assert_ne!(chunks[0].id, chunks[1].id);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let bad = "{\"source\": \"a.pdf\", \"source_type\": \"pdf\", \"content\": \"ok\"}\n{\"source\": \"a.pdf\", \"source_type\": \"ftp\", \"content\": \"x\"}\n";
        let err = parse_records(bad.as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
        assert!(parse_records("{\"source\": \"a.pdf\", \"source_type\": \"pdf\", \"content\": \" \"}".as_bytes()).is_err());
    }

    #[tokio::test]
    async fn test_import_registers_sources() {
        let ws = workspace();
        let chunks = parse_records(JSONL.as_bytes()).unwrap();
        let summary = import_chunks(&ws, chunks).await.unwrap();

        assert_eq!(
            summary,
            vec![
                SourceImport { source: "nano.pdf".into(), chunks: 2, added: 2 },
                SourceImport { source: "arduino/core".into(), chunks: 1, added: 1 },
            ]
        );
        assert_eq!(ws.store.count().await.unwrap(), 3);

        let nano = ws.registry.get_source("nano.pdf").await.unwrap().unwrap();
        assert_eq!(nano.status, SourceStatus::Success);
        assert_eq!(nano.metadata["schematics"], 1);
        let logs = ws.registry.logs_for("nano.pdf").await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].step, STEP);

        let repo = ws.registry.get_source("arduino/core").await.unwrap().unwrap();
        assert_eq!(repo.source_type, SourceType::Repository);
    }

    #[tokio::test]
    async fn test_reimport_adds_nothing() {
        let ws = workspace();
        import_chunks(&ws, parse_records(JSONL.as_bytes()).unwrap())
            .await
            .unwrap();
        let summary = import_chunks(&ws, parse_records(JSONL.as_bytes()).unwrap())
            .await
            .unwrap();

        assert!(summary.iter().all(|s| s.added == 0));
        assert_eq!(ws.store.count().await.unwrap(), 3);
        let schematic = ws
            .store
            .get(&parse_records(JSONL.as_bytes()).unwrap()[1].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(schematic.metadata_str(meta::IMAGE_REF), Some("nano/p4.png"));
    }
}
