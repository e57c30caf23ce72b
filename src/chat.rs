//! The chat turn: resolve the conversation, compose an answer, persist both
//! sides of the exchange.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use ragchat_core::compose::{derive_title, AnswerComposer, ConversationContext};
use ragchat_core::models::SourceRef;

use crate::conversations;
use crate::error::{ApiError, ApiResult};

fn default_use_history() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<i64>,
    #[serde(default = "default_use_history")]
    pub use_history: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
            use_history: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub conversation_id: i64,
    pub sources: Vec<SourceRef>,
}

pub struct ChatService {
    pool: SqlitePool,
    composer: Arc<AnswerComposer>,
}

impl ChatService {
    pub fn new(pool: SqlitePool, composer: Arc<AnswerComposer>) -> Self {
        Self { pool, composer }
    }

    /// Answer one message.
    ///
    /// A new conversation is committed before the model is called, so a
    /// provider failure can leave a conversation with no messages. The two
    /// messages themselves are written together or not at all.
    pub async fn chat(&self, request: ChatRequest) -> ApiResult<ChatResponse> {
        let message = request.message.as_str();
        if message.trim().is_empty() {
            return Err(ApiError::bad_request("Message must not be empty"));
        }

        let conversation_id = match request.conversation_id {
            Some(id) => {
                if !conversations::exists(&self.pool, id).await? {
                    return Err(ApiError::not_found("Conversation not found"));
                }
                id
            }
            None => {
                let title = derive_title(message);
                let created = conversations::create(&self.pool, Some(&title)).await?;
                tracing::info!(conversation_id = created.id, "conversation created");
                created.id
            }
        };

        let history = if request.use_history {
            conversations::history(&self.pool, conversation_id).await?
        } else {
            Vec::new()
        };
        let ctx = ConversationContext::new(Some(conversation_id), history);

        let answer = self
            .composer
            .answer(message, &ctx)
            .await
            .map_err(ApiError::Upstream)?;

        conversations::record_turn(&self.pool, conversation_id, message, &answer.text).await?;
        tracing::info!(
            conversation_id,
            grounded = answer.grounded,
            sources = answer.sources.len(),
            "chat turn recorded"
        );

        Ok(ChatResponse {
            answer: answer.text,
            conversation_id,
            sources: answer.sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, db, migrate};
    use async_trait::async_trait;
    use ragchat_core::chunk::TextSplitter;
    use ragchat_core::compose::{ChatModel, FALLBACK_ANSWER};
    use ragchat_core::embedding::Embedder;
    use ragchat_core::models::LoadedDocument;
    use ragchat_core::retriever::Retriever;
    use ragchat_core::store::memory::InMemoryVectorStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        fn model_name(&self) -> &str {
            "const"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[derive(Default)]
    struct CountingModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for CountingModel {
        fn model_name(&self) -> &str {
            "counting"
        }
        async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if prompt.contains("Conversation so far:") {
                Ok(format!("answer {} with history", n))
            } else {
                Ok(format!("answer {}", n))
            }
        }
    }

    struct BrokenModel;

    #[async_trait]
    impl ChatModel for BrokenModel {
        fn model_name(&self) -> &str {
            "broken"
        }
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("503 from provider")
        }
    }

    async fn service(
        tmp: &TempDir,
        model: Arc<dyn ChatModel>,
        seed_text: Option<&str>,
    ) -> ChatService {
        let config = Config::minimal(tmp.path().join("app.sqlite"));
        let pool = db::connect(&config).await.unwrap();
        migrate::migrate_relational(&pool).await.unwrap();

        let retriever = Arc::new(Retriever::new(
            Arc::new(ConstEmbedder),
            Arc::new(InMemoryVectorStore::new()),
            "documents",
        ));
        if let Some(text) = seed_text {
            let chunks = TextSplitter::new(500, 100)
                .unwrap()
                .split_documents(&[LoadedDocument::new(text, "guide.txt")]);
            retriever.add_chunks(&chunks, 8).await.unwrap();
        }
        let composer = Arc::new(AnswerComposer::new(retriever, model, 5));
        ChatService::new(pool, composer)
    }

    #[tokio::test]
    async fn empty_index_returns_fallback_and_persists_it() {
        let tmp = TempDir::new().unwrap();
        let model = Arc::new(CountingModel::default());
        let svc = service(&tmp, model.clone(), None).await;

        let resp = svc.chat(ChatRequest::new("What is a trust?")).await.unwrap();
        assert_eq!(resp.answer, FALLBACK_ANSWER);
        assert!(resp.sources.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);

        let msgs = conversations::messages(&svc.pool, resp.conversation_id).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].content, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn second_turn_sees_history() {
        let tmp = TempDir::new().unwrap();
        let model = Arc::new(CountingModel::default());
        let svc = service(&tmp, model, Some("Trusts hold assets.")).await;

        let first = svc.chat(ChatRequest::new("What is a trust?")).await.unwrap();
        assert_eq!(first.answer, "answer 0");
        assert_eq!(first.sources[0].source, "guide.txt");

        let conv = conversations::get(&svc.pool, first.conversation_id).await.unwrap().unwrap();
        assert_eq!(conv.title, "What is a trust?");

        let mut req = ChatRequest::new("And who manages it?");
        req.conversation_id = Some(first.conversation_id);
        let second = svc.chat(req.clone()).await.unwrap();
        assert_eq!(second.answer, "answer 1 with history");

        req.use_history = false;
        let third = svc.chat(req).await.unwrap();
        assert_eq!(third.answer, "answer 2");
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found_and_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp, Arc::new(CountingModel::default()), None).await;

        let mut req = ChatRequest::new("hello");
        req.conversation_id = Some(999);
        let err = svc.chat(req).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        let (_, total) = conversations::list(&svc.pool, 0, 20).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn message_is_stored_as_sent() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp, Arc::new(CountingModel::default()), None).await;

        let raw = "  What is probate?\n";
        let resp = svc.chat(ChatRequest::new(raw)).await.unwrap();

        let msgs = conversations::messages(&svc.pool, resp.conversation_id).await.unwrap();
        assert_eq!(msgs[0].content, raw);
        let conv = conversations::get(&svc.pool, resp.conversation_id).await.unwrap().unwrap();
        assert_eq!(conv.title, "What is probate?");
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp, Arc::new(CountingModel::default()), None).await;
        let err = svc.chat(ChatRequest::new("   ")).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn model_failure_is_upstream_and_records_no_messages() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp, Arc::new(BrokenModel), Some("Wills name executors.")).await;

        let err = svc.chat(ChatRequest::new("Who is an executor?")).await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));

        let (convs, total) = conversations::list(&svc.pool, 0, 20).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(convs[0].message_count, 0);
    }
}
