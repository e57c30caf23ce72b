//! `documents` table and the upload path.
//!
//! A row is keyed by filename: uploading a file with a name that already
//! exists replaces the file on disk and resets its row to `pending`.

use anyhow::{Context, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::path::Path;

use crate::loader::supported_file_type;
use crate::models::{format_ts, now_ts, DocumentRecord, DocumentStatus};

fn document_from_row(row: &SqliteRow) -> Result<DocumentRecord> {
    let status: String = row.get("status");
    let indexed_at: Option<i64> = row.get("indexed_at");
    Ok(DocumentRecord {
        id: row.get("id"),
        filename: row.get("filename"),
        file_path: row.get("file_path"),
        file_type: row.get("file_type"),
        file_size: row.get("file_size"),
        status: DocumentStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("unknown document status: {}", status))?,
        chunk_count: row.get("chunk_count"),
        indexed_at: indexed_at.map(format_ts),
    })
}

const SELECT_COLUMNS: &str =
    "SELECT id, filename, file_path, file_type, file_size, chunk_count, indexed_at, status FROM documents";

/// Reduce a client-supplied name to its final path component.
///
/// Both `/` and `\` count as separators. Returns `None` for names that are
/// empty or only dots once reduced.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        return None;
    }
    Some(name.to_string())
}

/// Insert or reset the row for `filename` to `pending`.
pub async fn upsert_pending(
    pool: &SqlitePool,
    filename: &str,
    file_path: &Path,
    file_type: Option<&str>,
    file_size: i64,
) -> Result<DocumentRecord> {
    let path = file_path.display().to_string();
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE filename = ?")
        .bind(filename)
        .fetch_optional(pool)
        .await?;

    let id = match existing {
        Some(id) => {
            sqlx::query(
                r#"
                UPDATE documents
                SET file_path = ?, file_type = ?, file_size = ?, chunk_count = 0,
                    indexed_at = NULL, status = 'pending'
                WHERE id = ?
                "#,
            )
            .bind(&path)
            .bind(file_type)
            .bind(file_size)
            .bind(id)
            .execute(pool)
            .await?;
            id
        }
        None => sqlx::query(
            r#"
            INSERT INTO documents (filename, file_path, file_type, file_size, status)
            VALUES (?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(filename)
        .bind(&path)
        .bind(file_type)
        .bind(file_size)
        .execute(pool)
        .await?
        .last_insert_rowid(),
    };

    get(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("document {} vanished after write", id))
}

/// Write uploaded bytes into the documents directory and record a
/// `pending` row for them.
pub async fn save_upload(
    pool: &SqlitePool,
    documents_dir: &Path,
    filename: &str,
    bytes: &[u8],
) -> Result<DocumentRecord> {
    tokio::fs::create_dir_all(documents_dir)
        .await
        .with_context(|| format!("Failed to create {}", documents_dir.display()))?;
    let path = documents_dir.join(filename);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let file_type = supported_file_type(&path);
    let size = bytes.len() as i64;
    let record = upsert_pending(pool, filename, &path, file_type.as_deref(), size).await?;
    tracing::info!(
        document_id = record.id,
        file = %filename,
        bytes = size,
        "document uploaded"
    );
    Ok(record)
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<DocumentRecord>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(document_from_row).transpose()
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<DocumentRecord>> {
    let rows = sqlx::query(&format!("{} ORDER BY filename ASC, id ASC", SELECT_COLUMNS))
        .fetch_all(pool)
        .await?;
    rows.iter().map(document_from_row).collect()
}

pub async fn mark_indexed(pool: &SqlitePool, id: i64, chunk_count: i64) -> Result<()> {
    sqlx::query(
        "UPDATE documents SET status = 'indexed', chunk_count = ?, indexed_at = ? WHERE id = ?",
    )
    .bind(chunk_count)
    .bind(now_ts())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_error(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE documents SET status = ?, chunk_count = 0 WHERE id = ?")
        .bind(DocumentStatus::Error.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
