//! Relational rows as returned by the API.
//!
//! Timestamps are stored as unix seconds and rendered as RFC 3339 UTC
//! strings (`2024-05-01T12:00:00Z`) when a row is read.

use serde::Serialize;

use ragchat_core::models::Role;

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// A registered user. The password hash never leaves the `users` module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    #[serde(skip_serializing)]
    pub id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Indexed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Indexed => "indexed",
            DocumentStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "indexed" => Some(DocumentStatus::Indexed),
            "error" => Some(DocumentStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub filename: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub status: DocumentStatus,
    #[serde(rename = "chunks_created")]
    pub chunk_count: i64,
    pub indexed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub id: i64,
    pub user_id: i64,
    pub questionnaire_title: String,
    pub step: i64,
    pub is_complete: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render_as_utc() {
        assert_eq!(format_ts(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_ts(1_714_564_800), "2024-05-01T12:00:00Z");
    }

    #[test]
    fn document_serializes_chunk_count_as_chunks_created() {
        let doc = DocumentRecord {
            id: 1,
            filename: "wills.txt".into(),
            file_path: "/srv/docs/wills.txt".into(),
            file_type: Some("txt".into()),
            file_size: Some(12),
            status: DocumentStatus::Indexed,
            chunk_count: 3,
            indexed_at: None,
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["chunks_created"], 3);
        assert_eq!(json["status"], "indexed");
        assert!(json.get("file_path").is_none());
    }
}
