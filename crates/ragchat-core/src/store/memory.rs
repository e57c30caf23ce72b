//! In-memory [`VectorStore`] implementation for tests.
//!
//! Uses a `HashMap` of collections behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every stored vector.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ScoredChunk};

use super::{rank, VectorStore};

struct StoredVector {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<StoredVector>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(
        &self,
        collection: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize> {
        if chunks.len() != vectors.len() {
            bail!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        let mut guard = self.collections.write().unwrap();
        let entries = guard.entry(collection.to_string()).or_default();
        let mut inserted = 0;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            if entries.iter().any(|e| e.chunk.id == chunk.id) {
                continue;
            }
            entries.push(StoredVector {
                chunk: chunk.clone(),
                vector: vector.clone(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn similarity_search(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let guard = self.collections.read().unwrap();
        let scored: Vec<ScoredChunk> = guard
            .get(collection)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| ScoredChunk {
                        chunk: e.chunk.clone(),
                        score: cosine_similarity(query_vec, &e.vector),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rank(scored, k))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let guard = self.collections.read().unwrap();
        Ok(guard.get(collection).map(Vec::len).unwrap_or(0))
    }

    async fn count_by_source(&self, collection: &str, source: &str) -> Result<usize> {
        let guard = self.collections.read().unwrap();
        Ok(guard
            .get(collection)
            .map(|entries| entries.iter().filter(|e| e.chunk.source() == source).count())
            .unwrap_or(0))
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.collections.write().unwrap().remove(collection);
        Ok(())
    }
}
