//! Non-streaming chat completions over HTTP.
//!
//! OpenAI and Groq share the `/chat/completions` format. Anthropic uses
//! `/messages` with the system prompt split out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use kbase_core::{Error, Result};

use crate::config::{LlmConfig, ResolvedProvider};
use crate::types::{ChatCompleter, ChatCompletion, ChatMessage, ChatUsage, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct HttpChatClient {
    client: Client,
    resolved: ResolvedProvider,
    timeout: Duration,
}

impl HttpChatClient {
    pub fn new(resolved: ResolvedProvider, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("chat client: {e}")))?;
        Ok(Self {
            client,
            resolved,
            timeout,
        })
    }

    /// `None` when no provider has an API key.
    pub fn from_config(config: &LlmConfig, timeout: Duration) -> Result<Option<Self>> {
        config
            .resolve_provider()
            .map(|resolved| Self::new(resolved, timeout))
            .transpose()
    }

    pub fn provider(&self) -> LlmProvider {
        self.resolved.provider
    }

    fn endpoint(&self) -> String {
        let root = self.resolved.base_url.trim_end_matches('/');
        match self.resolved.provider {
            LlmProvider::Anthropic => format!("{root}/messages"),
            LlmProvider::OpenAI | LlmProvider::Groq => format!("{root}/chat/completions"),
        }
    }

    fn map_transport(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                operation: "chat completion".into(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            Error::dependency(self.resolved.provider.to_string(), e)
        }
    }
}

pub(crate) fn openai_body(messages: &[ChatMessage], model: &str, temperature: f64, max_tokens: usize) -> Value {
    json!({
        "model": model,
        "messages": messages,
        "temperature": temperature,
        "max_tokens": max_tokens,
    })
}

pub(crate) fn anthropic_body(messages: &[ChatMessage], model: &str, temperature: f64, max_tokens: usize) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .collect();
    let conversation: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != "system").collect();

    let mut body = json!({
        "model": model,
        "messages": conversation,
        "temperature": temperature,
        "max_tokens": max_tokens,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }
    body
}

pub(crate) fn parse_openai(body: &Value, model: &str) -> Result<ChatCompletion> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| Error::Parse("chat response has no choices[0].message.content".into()))?;
    let usage = &body["usage"];
    let count = |key: &str| usage[key].as_u64().unwrap_or(0) as usize;
    Ok(ChatCompletion {
        content: content.to_string(),
        model: body["model"].as_str().unwrap_or(model).to_string(),
        usage: ChatUsage {
            prompt_tokens: count("prompt_tokens"),
            completion_tokens: count("completion_tokens"),
            total_tokens: count("total_tokens"),
        },
    })
}

pub(crate) fn parse_anthropic(body: &Value, model: &str) -> Result<ChatCompletion> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| Error::Parse("anthropic response has no content array".into()))?;
    let content: String = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect();
    let input = body["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize;
    let output = body["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize;
    Ok(ChatCompletion {
        content,
        model: body["model"].as_str().unwrap_or(model).to_string(),
        usage: ChatUsage {
            prompt_tokens: input,
            completion_tokens: output,
            total_tokens: input + output,
        },
    })
}

#[async_trait]
impl ChatCompleter for HttpChatClient {
    async fn chat_complete(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        temperature: f64,
        max_tokens: usize,
    ) -> Result<ChatCompletion> {
        let model = model.unwrap_or(self.resolved.model.as_str());
        let url = self.endpoint();
        debug!("Chat completion via {} with model {}", url, model);

        let request = match self.resolved.provider {
            LlmProvider::Anthropic => self
                .client
                .post(&url)
                .header("x-api-key", &self.resolved.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&anthropic_body(messages, model, temperature, max_tokens)),
            LlmProvider::OpenAI | LlmProvider::Groq => self
                .client
                .post(&url)
                .bearer_auth(&self.resolved.api_key)
                .json(&openai_body(messages, model, temperature, max_tokens)),
        };

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::dependency(
                self.resolved.provider.to_string(),
                format!("API error {status}: {body}"),
            ));
        }

        let body: Value = response.json().await.map_err(|e| self.map_transport(e))?;
        match self.resolved.provider {
            LlmProvider::Anthropic => parse_anthropic(&body, model),
            LlmProvider::OpenAI | LlmProvider::Groq => parse_openai(&body, model),
        }
    }

    fn default_model(&self) -> &str {
        &self.resolved.model
    }
}
