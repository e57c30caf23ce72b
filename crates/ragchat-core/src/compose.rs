//! Answer composition with a hallucination guard.
//!
//! [`AnswerComposer::answer`] retrieves the top-k chunks for a question and,
//! only when at least one chunk comes back, renders the fixed instruction
//! prompt and calls the [`ChatModel`]. With no supporting context the
//! composer returns [`FALLBACK_ANSWER`] and never touches the model.
//!
//! Conversation history is passed in explicitly through a
//! [`ConversationContext`] built by the caller for each request.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{HistoryMessage, Role, ScoredChunk, SourceRef};
use crate::retriever::Retriever;

/// Returned verbatim when retrieval finds nothing.
pub const FALLBACK_ANSWER: &str =
    "I don\u{2019}t have this information right now... maybe in future I can help you better.";

/// Title for conversations created without a usable message.
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Number of leading words kept in a derived title.
pub const TITLE_WORDS: usize = 8;

/// Default number of chunks retrieved per question.
pub const DEFAULT_K: usize = 5;

/// A hosted language model that completes a prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Per-request view of a conversation: who it is and what was said so far.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub conversation_id: Option<i64>,
    pub history: Vec<HistoryMessage>,
}

impl ConversationContext {
    pub fn new(conversation_id: Option<i64>, history: Vec<HistoryMessage>) -> Self {
        Self {
            conversation_id,
            history,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
    /// `false` when the fallback was returned without calling the model.
    pub grounded: bool,
}

pub struct AnswerComposer {
    retriever: Arc<Retriever>,
    model: Arc<dyn ChatModel>,
    k: usize,
}

impl AnswerComposer {
    pub fn new(retriever: Arc<Retriever>, model: Arc<dyn ChatModel>, k: usize) -> Self {
        Self {
            retriever,
            model,
            k,
        }
    }

    pub async fn answer(&self, question: &str, ctx: &ConversationContext) -> Result<Answer> {
        let chunks = self.retriever.similarity_search(question, self.k).await?;

        if chunks.is_empty() {
            tracing::info!(
                conversation_id = ?ctx.conversation_id,
                "no context retrieved, returning fallback"
            );
            return Ok(Answer {
                text: FALLBACK_ANSWER.to_string(),
                sources: Vec::new(),
                grounded: false,
            });
        }

        let prompt = build_prompt(
            &build_context(&chunks),
            &format_history(&ctx.history),
            question,
        );
        tracing::debug!(
            conversation_id = ?ctx.conversation_id,
            chunks = chunks.len(),
            history = ctx.history.len(),
            model = self.model.model_name(),
            "calling chat model"
        );
        let text = self.model.complete(&prompt).await?;

        Ok(Answer {
            text: text.trim().to_string(),
            sources: chunks
                .iter()
                .map(|c| SourceRef {
                    source: c.chunk.source().to_string(),
                    content: c.chunk.text.clone(),
                })
                .collect(),
            grounded: true,
        })
    }
}

/// First [`TITLE_WORDS`] words of `message`, with `"..."` appended when the
/// message is longer.
pub fn derive_title(message: &str) -> String {
    let words: Vec<&str> = message.split_whitespace().collect();
    if words.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    let mut title = words[..words.len().min(TITLE_WORDS)].join(" ");
    if words.len() > TITLE_WORDS {
        title.push_str("...");
    }
    title
}

/// Retrieved chunk texts separated by blank lines.
pub fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One `Human:` / `Assistant:` line per prior message.
pub fn format_history(history: &[HistoryMessage]) -> String {
    history
        .iter()
        .map(|m| match m.role {
            Role::User => format!("Human: {}", m.content),
            Role::Assistant => format!("Assistant: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(context: &str, chat_history: &str, question: &str) -> String {
    let history_block = if chat_history.is_empty() {
        String::new()
    } else {
        format!("\nConversation so far:\n{}\n", chat_history)
    };
    format!(
        r#"You are a legal AI assistant for Trust Inheritance.

STRICT RULES:
- Answer the user's question directly.
- DO NOT ask follow-up questions.
- DO NOT rephrase the user's question.
- DO NOT ask for clarification.
- Use ONLY the provided context.
- If the answer is not present, say:
"{fallback}"

Context:
{context}
{history_block}
User Question:
{question}

Answer (direct, factual, complete):"#,
        fallback = FALLBACK_ANSWER,
    )
}
