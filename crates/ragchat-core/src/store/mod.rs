//! Vector index abstraction.
//!
//! The [`VectorStore`] trait is the persistent named-collection interface the
//! ingestion pipeline writes to and the retriever reads from. Chunks are
//! addressed by similarity, never by key; the only deletion is dropping a
//! whole collection.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, ScoredChunk};

/// Abstract vector index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorStore::add) | Insert chunks with their vectors, skipping ids already present |
/// | [`similarity_search`](VectorStore::similarity_search) | `k` nearest chunks by cosine similarity |
/// | [`count`](VectorStore::count) | Number of entries in a collection |
/// | [`count_by_source`](VectorStore::count_by_source) | Entries attributed to one source file |
/// | [`delete_collection`](VectorStore::delete_collection) | Drop every entry of a collection |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert `chunks[i]` with `vectors[i]`. Chunks whose id already exists
    /// in the collection are left untouched.
    ///
    /// Returns the number of newly inserted entries.
    async fn add(&self, collection: &str, chunks: &[Chunk], vectors: &[Vec<f32>])
        -> Result<usize>;

    /// Return up to `k` chunks ordered by descending similarity, ties broken
    /// by chunk id.
    async fn similarity_search(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>>;

    async fn count(&self, collection: &str) -> Result<usize>;

    async fn count_by_source(&self, collection: &str, source: &str) -> Result<usize>;

    async fn delete_collection(&self, collection: &str) -> Result<()>;
}

/// Sort by score descending, then id ascending, and keep the first `k`.
pub fn rank(mut scored: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    scored.truncate(k);
    scored
}
