//! In-memory [`VectorStore`] implementation for tests and embedding-free use.
//!
//! Chunks live in a `Vec` behind `std::sync::RwLock`. Similarity is
//! [`lexical_similarity`] between the query and chunk content; every chunk
//! that passes the filter is a candidate, as with a brute-force vector scan.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, RetrievalFilter, RetrievedChunk};

use super::{lexical_similarity, rank_candidates, VectorStore};

/// In-memory chunk store.
pub struct InMemoryStore {
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of every stored chunk, in insertion order.
    pub fn all(&self) -> Vec<Chunk> {
        self.chunks.read().unwrap().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn add(&self, chunk: &Chunk) -> Result<bool> {
        let mut chunks = self.chunks.write().unwrap();
        if chunks.iter().any(|c| c.id == chunk.id) {
            return Ok(false);
        }
        chunks.push(chunk.clone());
        Ok(true)
    }

    async fn query(
        &self,
        text: &str,
        top_k: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<RetrievedChunk>> {
        let chunks = self.chunks.read().unwrap();
        let scored: Vec<(Chunk, f64)> = chunks
            .iter()
            .filter(|c| filter.matches(c))
            .map(|c| (c.clone(), lexical_similarity(text, &c.content)))
            .collect();
        Ok(rank_candidates(scored, top_k))
    }

    async fn delete_source(&self, source: &str) -> Result<u64> {
        let mut chunks = self.chunks.write().unwrap();
        let before = chunks.len();
        chunks.retain(|c| c.source != source);
        Ok((before - chunks.len()) as u64)
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks.iter().find(|c| c.id == id).cloned())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.chunks.read().unwrap().len() as u64)
    }
}
