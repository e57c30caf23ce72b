//! Retriever: an embedder bound to one vector store collection.
//!
//! Everything that reads from or writes to the vector index goes through a
//! [`Retriever`], so the embedding model used at insertion time is always
//! the one used at query time.

use std::sync::Arc;

use anyhow::Result;

use crate::embedding::Embedder;
use crate::models::{Chunk, ScoredChunk};
use crate::store::VectorStore;

/// Failure while adding chunks, split by which side failed.
#[derive(Debug, thiserror::Error)]
pub enum AddChunksError {
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("vector store write failed: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
        }
    }

    /// Return the `k` chunks nearest to `query`.
    ///
    /// A blank query, `k == 0`, or an empty collection returns nothing
    /// without calling the embedder.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if self.store.count(&self.collection).await? == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_query(query).await?;
        self.store
            .similarity_search(&self.collection, &query_vec, k)
            .await
    }

    /// Embed `chunks` in batches of `batch_size` and add them to the collection.
    ///
    /// Returns the number of entries actually inserted; chunks already in the
    /// collection are skipped by the store.
    pub async fn add_chunks(
        &self,
        chunks: &[Chunk],
        batch_size: usize,
    ) -> Result<usize, AddChunksError> {
        let batch_size = batch_size.max(1);
        let mut inserted = 0;
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(AddChunksError::Embedding)?;
            if vectors.len() != batch.len() {
                return Err(AddChunksError::Embedding(anyhow::anyhow!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            inserted += self
                .store
                .add(&self.collection, batch, &vectors)
                .await
                .map_err(AddChunksError::Store)?;
        }
        tracing::debug!(
            collection = %self.collection,
            total = chunks.len(),
            inserted,
            "chunks added to vector store"
        );
        Ok(inserted)
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count(&self.collection).await
    }

    pub async fn count_by_source(&self, source: &str) -> Result<usize> {
        self.store.count_by_source(&self.collection, source).await
    }

    pub async fn delete_collection(&self) -> Result<()> {
        self.store.delete_collection(&self.collection).await
    }
}
