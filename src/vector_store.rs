//! SQLite-backed [`VectorStore`].
//!
//! Vectors live in their own SQLite file (`[vectors].path`), one row per
//! chunk in `vector_chunks`, keyed by `(collection, id)`. Search is a
//! brute-force cosine scan over the collection, which is fine for the
//! document volumes this service indexes.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use ragchat_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use ragchat_core::models::{Chunk, Metadata, ScoredChunk};
use ragchat_core::store::{rank, VectorStore};

use crate::config::Config;
use crate::{db, migrate};

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the vector database named in the config, creating its schema.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect_path(&config.vectors.path).await?;
        migrate::migrate_vectors(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
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

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO vector_chunks
                    (id, collection, source, text, metadata_json, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(collection)
            .bind(chunk.source())
            .bind(&chunk.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn similarity_search(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, text, metadata_json, embedding FROM vector_chunks WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");
            let metadata: Metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
            let score = cosine_similarity(query_vec, &blob_to_vec(&blob));
            scored.push(ScoredChunk {
                chunk: Chunk {
                    id: row.get("id"),
                    text: row.get("text"),
                    metadata,
                },
                score,
            });
        }

        Ok(rank(scored, k))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_chunks WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn count_by_source(&self, collection: &str, source: &str) -> Result<usize> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM vector_chunks WHERE collection = ? AND source = ?",
        )
        .bind(collection)
        .bind(source)
        .fetch_one(&self.pool)
        .await?;
        Ok(n as usize)
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        sqlx::query("DELETE FROM vector_chunks WHERE collection = ?")
            .bind(collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::chunk::content_hash;
    use ragchat_core::models::SOURCE_KEY;
    use tempfile::TempDir;

    fn chunk(source: &str, text: &str) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Chunk {
            id: content_hash(source, text),
            text: text.to_string(),
            metadata,
        }
    }

    async fn store(tmp: &TempDir) -> SqliteVectorStore {
        let config = Config::minimal(tmp.path().join("app.sqlite"));
        SqliteVectorStore::open(&config).await.unwrap()
    }

    #[tokio::test]
    async fn add_skips_existing_ids() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let chunks = vec![chunk("a.txt", "alpha"), chunk("b.txt", "beta")];
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];

        assert_eq!(store.add("docs", &chunks, &vectors).await.unwrap(), 2);
        assert_eq!(store.add("docs", &chunks, &vectors).await.unwrap(), 0);
        assert_eq!(store.count("docs").await.unwrap(), 2);
        assert_eq!(store.count_by_source("docs", "a.txt").await.unwrap(), 1);
        assert_eq!(store.count("other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let chunks = vec![
            chunk("a.txt", "alpha"),
            chunk("b.txt", "beta"),
            chunk("c.txt", "gamma"),
        ];
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]];
        store.add("docs", &chunks, &vectors).await.unwrap();

        let hits = store.similarity_search("docs", &[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "alpha");
        assert_eq!(hits[1].chunk.text, "gamma");
        assert_eq!(hits[0].chunk.source(), "a.txt");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn delete_collection_empties_it() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        store
            .add("docs", &[chunk("a.txt", "alpha")], &[vec![1.0]])
            .await
            .unwrap();
        store.delete_collection("docs").await.unwrap();
        assert_eq!(store.count("docs").await.unwrap(), 0);
        assert!(store
            .similarity_search("docs", &[1.0], 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn mismatched_lengths_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let err = store
            .add("docs", &[chunk("a.txt", "alpha")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }
}
