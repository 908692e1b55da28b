//! OpenAI-compatible `/embeddings` client.
//!
//! The base URL is injectable so any compatible gateway (Azure proxy,
//! local inference server) can stand in for api.openai.com.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use kbase_core::deadline::DEFAULT_CALL_TIMEOUT;
use kbase_core::{Error, Result};

use crate::embedder::{BatchEmbedding, Embedder, Embedding, DEFAULT_BATCH_LIMIT};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Settings for the HTTP embedder.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub dimension: usize,
    pub timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            base_url: DEFAULT_EMBEDDING_BASE_URL.into(),
            dimension: DEFAULT_EMBEDDING_DIM,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl EmbeddingConfig {
    /// `OPENAI_API_KEY`, `KBASE_EMBEDDING_MODEL`, `KBASE_EMBEDDING_BASE_URL`.
    pub fn from_env(timeout: Duration) -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            model: std::env::var("KBASE_EMBEDDING_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("KBASE_EMBEDDING_BASE_URL").unwrap_or(defaults.base_url),
            dimension: std::env::var("KBASE_EMBEDDING_DIM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.dimension),
            timeout,
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: usize,
}

pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    dimension: usize,
    timeout: Duration,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("embedding API key is not set".into()))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("embedding client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            dimension: config.dimension,
            timeout: config.timeout,
        })
    }

    async fn request(&self, texts: &[&str]) -> Result<BatchEmbedding> {
        let mut body = json!({ "model": self.model, "input": texts });
        if self.model.starts_with("text-embedding-3") {
            body["dimensions"] = json!(self.dimension);
        }

        debug!(endpoint = %self.endpoint, inputs = texts.len(), "embedding request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::dependency("embedding", format!("API error {status}: {text}")));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport(e))?;
        collect_embeddings(parsed, texts.len(), self.dimension)
    }

    fn map_transport(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                operation: "embedding".into(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            Error::dependency("embedding", e)
        }
    }
}

/// Put provider output back into input order and check its shape.
fn collect_embeddings(mut response: EmbeddingsResponse, expected: usize, dim: usize) -> Result<BatchEmbedding> {
    if response.data.len() != expected {
        return Err(Error::dependency(
            "embedding",
            format!("expected {expected} embeddings, got {}", response.data.len()),
        ));
    }
    response.data.sort_by_key(|d| d.index);

    let total_tokens = response.usage.map(|u| u.total_tokens).unwrap_or(0);
    let per_item = if expected > 0 { total_tokens / expected } else { 0 };

    let embeddings = response
        .data
        .into_iter()
        .map(|d| {
            if d.embedding.len() != dim {
                return Err(Error::DimensionMismatch {
                    left: d.embedding.len(),
                    right: dim,
                });
            }
            Ok(Embedding {
                embedding: d.embedding,
                tokens: per_item,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(BatchEmbedding {
        embeddings,
        total_tokens,
    })
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut batch = self.request(&[text]).await?;
        let mut single = batch
            .embeddings
            .pop()
            .ok_or_else(|| Error::dependency("embedding", "empty response"))?;
        single.tokens = batch.total_tokens;
        Ok(single)
    }

    async fn embed_page(&self, texts: &[&str]) -> Result<BatchEmbedding> {
        if texts.is_empty() {
            return Ok(BatchEmbedding::default());
        }
        self.request(texts).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_limit(&self) -> usize {
        DEFAULT_BATCH_LIMIT
    }

    fn name(&self) -> &str {
        &self.model
    }
}
