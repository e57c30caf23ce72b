//! Chat model providers.
//!
//! [`OpenAiChatModel`] sends the composed prompt as a single user message to
//! `POST /v1/chat/completions` and returns the first choice's content.
//! [`DisabledChatModel`] always errors, so a server without an API key can
//! still answer from the fallback path when nothing is retrieved.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use ragchat_core::compose::ChatModel;

use crate::config::LlmConfig;
use crate::provider::{build_client, openai_api_key, post_json_with_retry, OPENAI_BASE_URL};

pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("Chat model provider is disabled")
    }
}

pub struct OpenAiChatModel {
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key: openai_api_key()?,
            client: build_client(config.timeout_secs)?,
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/')),
            Some(&self.api_key),
            &self.request_body(prompt),
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_completion(&json)
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Build the chat model named by `llm.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChatModel)),
        "openai" => Ok(Arc::new(OpenAiChatModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
