//! Finding schematic chunks worth sending back to the vision model.
//!
//! Candidates are schematic chunks with an image reference, gathered in
//! preference order:
//!
//! 1. schematic chunks already in the initial results, by rank;
//! 2. schematic chunks of the sources seen in the initial results;
//! 3. schematic chunks of the source named by the caller's filter.
//!
//! Each chunk id and each image reference appears at most once.

use std::collections::HashSet;

use anyhow::Result;

use crate::lexicon;
use crate::models::{Chunk, ContentCategory, RetrievalFilter, RetrievedChunk};
use crate::store::VectorStore;

/// Whether `query` is about pins, buses, power, or wiring.
pub fn is_schematic_query(query: &str) -> bool {
    lexicon::is_schematic_query(query)
}

struct Candidates {
    out: Vec<Chunk>,
    ids: HashSet<String>,
    images: HashSet<String>,
    limit: usize,
}

impl Candidates {
    fn full(&self) -> bool {
        self.out.len() >= self.limit
    }

    fn offer(&mut self, chunk: &Chunk) {
        if self.full() || !chunk.is_schematic() {
            return;
        }
        let Some(image) = chunk.image_ref() else {
            return;
        };
        if self.ids.contains(&chunk.id) || self.images.contains(image) {
            return;
        }
        self.ids.insert(chunk.id.clone());
        self.images.insert(image.to_string());
        self.out.push(chunk.clone());
    }
}

/// Collect up to `limit` reprocessing candidates for `query`.
///
/// An empty result is normal: the sources may have no schematic chunks.
pub async fn locate(
    store: &dyn VectorStore,
    query: &str,
    initial: &[RetrievedChunk],
    filter: &RetrievalFilter,
    limit: usize,
) -> Result<Vec<Chunk>> {
    let mut candidates = Candidates {
        out: Vec::new(),
        ids: HashSet::new(),
        images: HashSet::new(),
        limit,
    };
    if limit == 0 {
        return Ok(candidates.out);
    }

    for r in initial {
        candidates.offer(&r.chunk);
    }

    let mut sources: Vec<String> = Vec::new();
    for r in initial {
        if !sources.contains(&r.chunk.source) {
            sources.push(r.chunk.source.clone());
        }
    }
    if let Some(ref s) = filter.source {
        if !sources.contains(s) {
            sources.push(s.clone());
        }
    }

    for source in sources {
        if candidates.full() {
            break;
        }
        let scoped = RetrievalFilter {
            source: Some(source),
            source_type: filter.source_type,
            category: Some(ContentCategory::Schematic),
        };
        for r in store.query(query, limit, &scoped).await? {
            candidates.offer(&r.chunk);
        }
    }

    tracing::debug!(
        query,
        candidates = candidates.out.len(),
        "located schematic candidates"
    );
    Ok(candidates.out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{meta, SourceType};
    use crate::store::memory::InMemoryStore;
    use chrono::Utc;
    use serde_json::{Map, Value};

    fn chunk(id: &str, source: &str, category: ContentCategory, image: Option<&str>) -> Chunk {
        let mut metadata = Map::new();
        if let Some(img) = image {
            metadata.insert(meta::IMAGE_REF.to_string(), Value::from(img));
        }
        Chunk {
            id: id.to_string(),
            content: format!("{} content", id),
            source: source.to_string(),
            source_type: SourceType::Document,
            category,
            location: Some("2".to_string()),
            metadata,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_initial_schematics_come_first() {
        let store = InMemoryStore::new();
        let s2 = chunk("s2", "a.pdf", ContentCategory::Schematic, Some("a/p2.png"));
        store.add(&s2).await.unwrap();

        let initial = vec![
            RetrievedChunk::new(chunk("t1", "a.pdf", ContentCategory::Text, None), 0.4, 0),
            RetrievedChunk::new(
                chunk("s1", "a.pdf", ContentCategory::Schematic, Some("a/p1.png")),
                0.3,
                1,
            ),
        ];
        let found = locate(&store, "spi pins", &initial, &RetrievalFilter::default(), 3)
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_dedup_by_image_and_limit() {
        let store = InMemoryStore::new();
        store
            .add(&chunk("s1", "a.pdf", ContentCategory::Schematic, Some("a/p1.png")))
            .await
            .unwrap();
        store
            .add(&chunk("s1-again", "a.pdf", ContentCategory::Schematic, Some("a/p1.png")))
            .await
            .unwrap();
        store
            .add(&chunk("s3", "a.pdf", ContentCategory::Schematic, Some("a/p3.png")))
            .await
            .unwrap();

        let found = locate(&store, "pins", &[], &RetrievalFilter::source("a.pdf"), 5)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let limited = locate(&store, "pins", &[], &RetrievalFilter::source("a.pdf"), 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_chunks_without_image_are_skipped() {
        let store = InMemoryStore::new();
        store
            .add(&chunk("s1", "a.pdf", ContentCategory::Schematic, None))
            .await
            .unwrap();
        let found = locate(&store, "pins", &[], &RetrievalFilter::source("a.pdf"), 3)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_no_sources_no_candidates() {
        let store = InMemoryStore::new();
        let found = locate(&store, "pins", &[], &RetrievalFilter::default(), 3)
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
