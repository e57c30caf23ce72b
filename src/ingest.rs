//! Batch indexing: load → split → embed → store, then reconcile the
//! `documents` table with what was indexed.
//!
//! One call indexes the whole documents directory. Chunk ids are content
//! hashes and the vector store ignores ids it already holds, so indexing
//! the same directory twice adds nothing the second time.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use serde::Serialize;
use sqlx::SqlitePool;

use ragchat_core::chunk::TextSplitter;
use ragchat_core::retriever::{AddChunksError, Retriever};

use crate::config::Config;
use crate::documents;
use crate::error::ApiError;
use crate::loader;

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub status: &'static str,
    pub documents_loaded: usize,
    pub chunks_created: usize,
    pub vectorstore_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<AddChunksError> for IndexError {
    fn from(err: AddChunksError) -> Self {
        match err {
            AddChunksError::Embedding(e) => IndexError::Embedding(e),
            AddChunksError::Store(e) => IndexError::Other(e),
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Embedding(e) => ApiError::Upstream(e),
            IndexError::Other(e) => ApiError::Internal(e),
        }
    }
}

/// Index everything in `config.documents.path` into the retriever's collection.
pub async fn index_documents(
    pool: &SqlitePool,
    config: &Config,
    retriever: &Retriever,
) -> Result<IndexReport, IndexError> {
    let dir = config.documents.path.clone();
    let report = tokio::task::spawn_blocking(move || loader::load_directory(&dir))
        .await
        .context("document loader task panicked")??;

    let splitter = TextSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
    let chunks = splitter.split_documents(&report.documents);
    tracing::info!(
        documents = report.documents.len(),
        chunks = chunks.len(),
        "split documents"
    );

    let inserted = retriever.add_chunks(&chunks, config.embedding.batch_size).await?;

    reconcile_documents(pool, config, retriever, &report).await?;

    let vectorstore_count = retriever.count().await?;
    tracing::info!(
        chunks = chunks.len(),
        inserted,
        vectorstore_count,
        "indexing completed"
    );

    Ok(IndexReport {
        status: "completed",
        documents_loaded: report.documents.len(),
        chunks_created: chunks.len(),
        vectorstore_count,
    })
}

/// Bring every `documents` row in line with the load report.
///
/// Files that loaded become `indexed` with their vector count; files that
/// failed, or rows whose file is gone, become `error`. Files placed in the
/// directory without going through upload get a row of their own.
async fn reconcile_documents(
    pool: &SqlitePool,
    config: &Config,
    retriever: &Retriever,
    report: &loader::LoadReport,
) -> anyhow::Result<()> {
    let loaded: HashSet<&str> = report.loaded_files.iter().map(String::as_str).collect();
    let failed: HashSet<&str> = report.failed_files.iter().map(String::as_str).collect();

    let mut rows: HashMap<String, i64> = documents::list(pool)
        .await?
        .into_iter()
        .map(|d| (d.filename, d.id))
        .collect();

    for filename in loaded.iter().chain(failed.iter()) {
        if rows.contains_key(*filename) {
            continue;
        }
        let path = config.documents.path.join(filename);
        let size = tokio::fs::metadata(&path)
            .await
            .map(|m| m.len() as i64)
            .unwrap_or(0);
        let file_type = loader::supported_file_type(&path);
        let record =
            documents::upsert_pending(pool, filename, &path, file_type.as_deref(), size).await?;
        rows.insert(record.filename, record.id);
    }

    for (filename, id) in &rows {
        if loaded.contains(filename.as_str()) {
            let count = retriever.count_by_source(filename).await?;
            documents::mark_indexed(pool, *id, count as i64).await?;
        } else {
            if !failed.contains(filename.as_str()) {
                tracing::warn!(file = %filename, "document missing from directory");
            }
            documents::mark_error(pool, *id).await?;
        }
    }
    Ok(())
}
