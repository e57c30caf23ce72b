//! Document loader.
//!
//! Reads every supported file directly inside the documents directory
//! (no recursion) and turns it into one or more [`LoadedDocument`]s:
//!
//! | Extension | Reader | Documents per file |
//! |-----------|--------|--------------------|
//! | `.txt` | UTF-8 text | 1 |
//! | `.pdf` | `pdf-extract` | 1 |
//! | `.docx` | `word/document.xml` runs | 1 |
//! | `.csv` | `csv`, header row required | 1 per record |
//! | `.json` | flattened `path: value` lines | 1 per top-level array element, else 1 |
//!
//! Every document carries `source` (the filename) and `file_type` (the
//! lowercase extension) metadata. A file that fails to read or parse is
//! logged and skipped; the rest of the batch still loads.

use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

use ragchat_core::flatten::{json_records, DEFAULT_MAX_DEPTH};
use ragchat_core::models::LoadedDocument;

use crate::extract;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "pdf", "csv", "json", "docx"];

pub const FILE_TYPE_KEY: &str = "file_type";
pub const ROW_KEY: &str = "row";

/// Outcome of loading a directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<LoadedDocument>,
    /// Filenames that loaded without error, including ones that produced no documents.
    pub loaded_files: Vec<String>,
    pub failed_files: Vec<String>,
}

/// Load every supported file in `dir`, returning only the documents.
pub fn load_documents(dir: &Path) -> Result<Vec<LoadedDocument>> {
    Ok(load_directory(dir)?.documents)
}

/// Load every supported file in `dir`.
///
/// A missing directory is created and yields an empty report.
pub fn load_directory(dir: &Path) -> Result<LoadReport> {
    let mut report = LoadReport::default();

    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create documents directory: {}", dir.display()))?;
        tracing::info!(path = %dir.display(), "created empty documents directory");
        return Ok(report);
    }

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().to_string();
        let Some(file_type) = supported_file_type(path) else {
            tracing::debug!(file = %filename, "skipping unsupported file type");
            continue;
        };

        match load_file(path, &filename, &file_type) {
            Ok(docs) => {
                tracing::debug!(file = %filename, documents = docs.len(), "loaded file");
                report.documents.extend(docs);
                report.loaded_files.push(filename);
            }
            Err(e) => {
                tracing::warn!(
                    file = %filename,
                    error = %format!("{:#}", e),
                    "failed to load file"
                );
                report.failed_files.push(filename);
            }
        }
    }

    tracing::info!(
        documents = report.documents.len(),
        files = report.loaded_files.len(),
        failed = report.failed_files.len(),
        "documents loaded"
    );
    Ok(report)
}

/// Lowercase extension of `path` when it is one the loader reads.
pub fn supported_file_type(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    SUPPORTED_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

fn load_file(path: &Path, filename: &str, file_type: &str) -> Result<Vec<LoadedDocument>> {
    let tag = |doc: LoadedDocument| doc.with_meta(FILE_TYPE_KEY, file_type);

    let docs = match file_type {
        "txt" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            vec![tag(LoadedDocument::new(text, filename))]
        }
        "pdf" => {
            let bytes = std::fs::read(path)?;
            let text = extract::extract_pdf(&bytes)?;
            vec![tag(LoadedDocument::new(text, filename))]
        }
        "docx" => {
            let bytes = std::fs::read(path)?;
            let text = extract::extract_docx(&bytes)?;
            vec![tag(LoadedDocument::new(text, filename))]
        }
        "csv" => csv_records(path)?
            .into_iter()
            .enumerate()
            .map(|(row, text)| tag(LoadedDocument::new(text, filename).with_meta(ROW_KEY, row)))
            .collect(),
        "json" => {
            let content = std::fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", filename))?;
            json_records(&value, DEFAULT_MAX_DEPTH)
                .into_iter()
                .map(|(row, text)| {
                    let doc = tag(LoadedDocument::new(text, filename));
                    match row {
                        Some(row) => doc.with_meta(ROW_KEY, row),
                        None => doc,
                    }
                })
                .collect()
        }
        other => anyhow::bail!("unsupported file type: {}", other),
    };

    Ok(docs)
}

/// One `"header: value"` block per CSV record.
fn csv_records(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        let text = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| format!("{}: {}", h.trim(), v.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        records.push(text);
    }
    Ok(records)
}
