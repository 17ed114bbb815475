//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the only way the query pipeline reaches
//! chunk storage and similarity search, so the backend (SQLite with an
//! embedding provider, in-memory, or a remote service) is pluggable.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::lexicon;
use crate::models::{Chunk, RetrievalFilter, RetrievedChunk};

/// Abstract chunk storage with nearest-neighbor search.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorStore::add) | Insert a chunk; duplicate ids are a no-op |
/// | [`query`](VectorStore::query) | Top-K chunks by similarity to a text |
/// | [`delete_source`](VectorStore::delete_source) | Remove every chunk of a source |
/// | [`get`](VectorStore::get) | Fetch one chunk by id |
/// | [`count`](VectorStore::count) | Total chunks stored |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert a chunk. Returns `false` when a chunk with the same id
    /// already exists, in which case nothing is written.
    async fn add(&self, chunk: &Chunk) -> Result<bool>;

    /// Return up to `top_k` chunks matching `filter`, most similar first,
    /// with contiguous ranks starting at 0.
    async fn query(
        &self,
        text: &str,
        top_k: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Delete all chunks of a source. Returns how many were removed.
    async fn delete_source(&self, source: &str) -> Result<u64>;

    async fn get(&self, id: &str) -> Result<Option<Chunk>>;

    async fn count(&self) -> Result<u64>;
}

/// Fraction of distinct query tokens that occur in `text`, in `[0, 1]`.
///
/// Used by backends that rank without embeddings.
pub fn lexical_similarity(query: &str, text: &str) -> f64 {
    let q = lexicon::tokens(query);
    if q.is_empty() {
        return 0.0;
    }
    let t = lexicon::tokens(text);
    let hits = q.iter().filter(|tok| t.contains(*tok)).count();
    hits as f64 / q.len() as f64
}

/// Sort `(chunk, similarity)` pairs best-first, truncate, and assign ranks.
///
/// Ties keep insertion order.
pub fn rank_candidates(mut scored: Vec<(Chunk, f64)>, top_k: usize) -> Vec<RetrievedChunk> {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
        .into_iter()
        .enumerate()
        .map(|(rank, (chunk, sim))| RetrievedChunk::new(chunk, sim, rank))
        .collect()
}
