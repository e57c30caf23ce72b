//! Core data models shared by ingestion, retrieval, and chat.
//!
//! Relational rows (users, conversations, documents) live in the app crate;
//! the types here are the ones that flow through the pure pipeline.

use serde::{Deserialize, Serialize};

/// Free-form metadata attached to loaded documents and chunks.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding the originating filename.
pub const SOURCE_KEY: &str = "source";

/// Value used when a chunk has no `source` metadata.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// A prior turn of a conversation, as fed to the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl HistoryMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Raw text produced by the document loader, before splitting.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub text: String,
    pub metadata: Metadata,
}

impl LoadedDocument {
    /// Creates a document tagged with `source`.
    pub fn new(text: impl Into<String>, source: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(|v| v.as_str())
    }
}

/// A bounded span of text: the unit stored in and retrieved from the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// SHA-256 of source and text; identical content maps to the same id.
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn source(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or(UNKNOWN_SOURCE)
    }
}

/// A chunk returned by similarity search, with its cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Citation returned alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub content: String,
}
