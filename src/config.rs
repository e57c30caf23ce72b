//! TOML configuration.
//!
//! Every section except `[db]` has serde defaults, so the smallest valid
//! config file is:
//!
//! ```toml
//! [db]
//! path = "./data/ragchat.sqlite"
//! ```
//!
//! A few values can be overridden from the environment after parsing:
//! `RAGCHAT_DB_PATH` replaces `db.path` and `RAGCHAT_SECRET_KEY` replaces
//! `auth.secret_key`. Provider API keys are read from `OPENAI_API_KEY` when
//! the provider is constructed.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Secret used when neither the config file nor the environment sets one.
pub const INSECURE_DEFAULT_SECRET: &str = "change-me-in-production";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub vectors: VectorsConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            debug: false,
        }
    }
}

fn default_app_name() -> String {
    "Toolboxx Chat Bot".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Location of the persistent vector index.
#[derive(Debug, Deserialize, Clone)]
pub struct VectorsConfig {
    #[serde(default = "default_vectors_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for VectorsConfig {
    fn default() -> Self {
        Self {
            path: default_vectors_path(),
            collection: default_collection(),
        }
    }
}

fn default_vectors_path() -> PathBuf {
    PathBuf::from("./vector_db/vectors.sqlite")
}
fn default_collection() -> String {
    "documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_path")]
    pub path: PathBuf,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            path: default_documents_path(),
        }
    }
}

fn default_documents_path() -> PathBuf {
    PathBuf::from("./data/documents")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    ragchat_core::compose::DEFAULT_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Override for the OpenAI-compatible base URL.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
            url: None,
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:8000".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_secret_key")]
    pub secret_key: String,
    #[serde(default = "default_expire_minutes")]
    pub access_token_expire_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: default_secret_key(),
            access_token_expire_minutes: default_expire_minutes(),
        }
    }
}

impl AuthConfig {
    pub fn uses_default_secret(&self) -> bool {
        self.secret_key == INSECURE_DEFAULT_SECRET
    }
}

fn default_secret_key() -> String {
    INSECURE_DEFAULT_SECRET.to_string()
}
fn default_expire_minutes() -> i64 {
    30
}

impl Config {
    /// A config with every default and the given database path.
    ///
    /// The vector index and documents directory are placed next to the
    /// database file.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let base = db_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            app: AppConfig::default(),
            vectors: VectorsConfig {
                path: base.join("vectors.sqlite"),
                collection: default_collection(),
            },
            documents: DocumentsConfig {
                path: base.join("documents"),
            },
            db: DbConfig { path: db_path },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
        }
    }

    /// Apply `RAGCHAT_DB_PATH` and `RAGCHAT_SECRET_KEY` if set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("RAGCHAT_DB_PATH") {
            if !path.is_empty() {
                self.db.path = PathBuf::from(path);
            }
        }
        if let Ok(secret) = std::env::var("RAGCHAT_SECRET_KEY") {
            if !secret.is_empty() {
                self.auth.secret_key = secret;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
        }

        if self.retrieval.k == 0 {
            bail!("retrieval.k must be >= 1");
        }

        if self.vectors.collection.trim().is_empty() {
            bail!("vectors.collection must not be empty");
        }

        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }

        match self.llm.provider.as_str() {
            "disabled" | "openai" => {}
            other => bail!(
                "Unknown llm provider: '{}'. Must be disabled or openai.",
                other
            ),
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("llm.temperature must be in [0.0, 2.0]");
        }
        if self.llm.max_tokens == 0 {
            bail!("llm.max_tokens must be > 0");
        }

        if self.auth.secret_key.is_empty() {
            bail!("auth.secret_key must not be empty");
        }
        if self.auth.access_token_expire_minutes <= 0 {
            bail!("auth.access_token_expire_minutes must be > 0");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Config {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn defaults_fill_every_section() {
        let config = parse("[db]\npath = \"./data/ragchat.sqlite\"\n");
        assert_eq!(config.app.name, "Toolboxx Chat Bot");
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.retrieval.k, 5);
        assert_eq!(config.vectors.collection, "documents");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.llm.max_tokens, 1000);
        assert_eq!(config.auth.access_token_expire_minutes, 30);
        assert_eq!(config.server.cors_origins.len(), 2);
        assert!(!config.embedding.is_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let config = parse(
            r#"
[db]
path = "x.sqlite"

[chunking]
chunk_size = 100
chunk_overlap = 100
"#,
        );
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("chunk_overlap"));
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let config = parse(
            r#"
[db]
path = "x.sqlite"

[embedding]
provider = "openai"
"#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = parse(
            r#"
[db]
path = "x.sqlite"

[llm]
provider = "llamafile"
"#,
        );
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("llamafile"));
    }

    #[test]
    fn minimal_places_stores_next_to_db() {
        let config = Config::minimal("/tmp/rc/app.sqlite");
        assert_eq!(config.vectors.path, PathBuf::from("/tmp/rc/vectors.sqlite"));
        assert_eq!(config.documents.path, PathBuf::from("/tmp/rc/documents"));
        assert!(config.validate().is_ok());
    }
}
