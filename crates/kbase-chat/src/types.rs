//! Chat types and the completion collaborator trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kbase_core::Result;

/// LLM provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
    Groq,
}

impl LlmProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "https://api.openai.com/v1",
            LlmProvider::Anthropic => "https://api.anthropic.com/v1",
            LlmProvider::Groq => "https://api.groq.com/openai/v1",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::OpenAI => write!(f, "openai"),
            LlmProvider::Anthropic => write!(f, "anthropic"),
            LlmProvider::Groq => write!(f, "groq"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub content: String,
    pub model: String,
    pub usage: ChatUsage,
}

/// Generative model used for LLM rerank and answer synthesis.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// `model = None` uses the completer's default model.
    async fn chat_complete(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        temperature: f64,
        max_tokens: usize,
    ) -> Result<ChatCompletion>;

    fn default_model(&self) -> &str;
}
