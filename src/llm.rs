//! Chat-completion provider.
//!
//! Treated as a text-in, text-out black box over any OpenAI-compatible
//! `chat/completions` endpoint (Groq by default). Completions only ever
//! enrich results: fix suggestions on failed test runs, and a synthesized
//! answer on top of semantic search passages. A missing key leaves the
//! workspace without a provider; nothing else changes.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::CompletionConfig;
use crate::embedding::{http_client, post_json_with_retry};
use crate::error::{CoreError, CoreResult};
use crate::models::Passage;
use crate::test_report::tail_chars;

/// Temperature for debugging advice. Low, so repeated runs agree.
pub const FIX_TEMPERATURE: f32 = 0.1;
pub const ANSWER_TEMPERATURE: f32 = 0.2;

/// Maximum characters of test output sent with a fix request.
const FIX_LOG_CHARS: usize = 6000;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;
}

pub struct OpenAICompletion {
    url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAICompletion {
    pub fn new(config: &CompletionConfig) -> CoreResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                CoreError::ProviderUnavailable(format!(
                    "{} environment variable not set",
                    config.api_key_env
                ))
            })?;
        Ok(Self {
            url: config.url.clone(),
            model: config.model.clone(),
            api_key,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "stream": false,
        });
        let json = post_json_with_retry("Completion", 0, || {
            self.client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.to_string())
        .ok_or_else(|| anyhow!("Invalid completion response: missing choices[0].message.content"))
}

/// Build the configured completion provider.
///
/// Returns [`CoreError::ProviderUnavailable`] when completions are disabled
/// or the key variable is unset.
pub fn create_completion(config: &CompletionConfig) -> CoreResult<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAICompletion::new(config)?)),
        "disabled" => Err(CoreError::ProviderUnavailable(
            "completion provider is disabled".into(),
        )),
        other => Err(CoreError::ProviderUnavailable(format!(
            "unknown completion provider: {}",
            other
        ))),
    }
}

/// Ask for the exact fix for a failed test run.
pub async fn suggest_test_fix(provider: &dyn CompletionProvider, logs: &str) -> Result<String> {
    let messages = [
        ChatMessage::system(
            "You are an expert debugger. Provide the exact fix for the test failure.",
        ),
        ChatMessage::user(format!(
            "The tests failed with this output:\n\n{}",
            tail_chars(logs, FIX_LOG_CHARS)
        )),
    ];
    provider.complete(&messages, FIX_TEMPERATURE).await
}

/// Answer `question` from retrieved passages only.
pub async fn synthesize_answer(
    provider: &dyn CompletionProvider,
    question: &str,
    passages: &[Passage],
) -> Result<String> {
    let mut context = String::new();
    for p in passages {
        context.push_str(&format!("--- {} (chunk {})\n{}\n\n", p.file, p.chunk_index, p.text));
    }
    let messages = [
        ChatMessage::system(
            "You answer questions about a code base using only the provided excerpts. \
             Cite file paths when relevant.",
        ),
        ChatMessage::user(format!("EXCERPTS:\n{}QUESTION: {}", context, question)),
    ];
    provider.complete(&messages, ANSWER_TEMPERATURE).await
}
