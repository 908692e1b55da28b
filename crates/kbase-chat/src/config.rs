//! LLM configuration loading and provider selection.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::LlmProvider;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";

/// Stored LLM configuration (`llm-config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_preferred")]
    pub preferred_provider: String,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    #[serde(default = "default_groq_model")]
    pub groq_model: String,
    /// Replaces the resolved provider's endpoint root, e.g. a proxy.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_preferred() -> String {
    "auto".into()
}
fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.into()
}
fn default_anthropic_model() -> String {
    DEFAULT_ANTHROPIC_MODEL.into()
}
fn default_groq_model() -> String {
    DEFAULT_GROQ_MODEL.into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            preferred_provider: default_preferred(),
            openai_api_key: None,
            anthropic_api_key: None,
            groq_api_key: None,
            openai_model: default_openai_model(),
            anthropic_model: default_anthropic_model(),
            groq_model: default_groq_model(),
            base_url: None,
        }
    }
}

/// Provider, model, key and endpoint root chosen for chat calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProvider {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
}

impl LlmConfig {
    /// Load config from file, falling back to env vars and defaults.
    pub fn load(config_path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(config_path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!("Ignoring malformed {}: {}", config_path.display(), e);
                LlmConfig::default()
            }),
            Err(_) => LlmConfig::default(),
        };
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        if self.openai_api_key.is_none() {
            self.openai_api_key = env("OPENAI_API_KEY");
        }
        if self.anthropic_api_key.is_none() {
            self.anthropic_api_key = env("ANTHROPIC_API_KEY");
        }
        if self.groq_api_key.is_none() {
            self.groq_api_key = env("GROQ_API_KEY");
        }
        if self.base_url.is_none() {
            self.base_url = env("KBASE_LLM_BASE_URL");
        }
    }

    /// Resolve which provider and model to use.
    pub fn resolve_provider(&self) -> Option<ResolvedProvider> {
        let pick = |provider: LlmProvider, key: &Option<String>, model: &str| {
            key.as_ref().map(|k| ResolvedProvider {
                provider,
                model: model.to_string(),
                api_key: k.clone(),
                base_url: self
                    .base_url
                    .clone()
                    .unwrap_or_else(|| provider.default_base_url().to_string()),
            })
        };

        match self.preferred_provider.as_str() {
            "openai" => pick(LlmProvider::OpenAI, &self.openai_api_key, &self.openai_model),
            "anthropic" => pick(LlmProvider::Anthropic, &self.anthropic_api_key, &self.anthropic_model),
            "groq" => pick(LlmProvider::Groq, &self.groq_api_key, &self.groq_model),
            // Auto mode: Anthropic > Groq > OpenAI
            "auto" => pick(LlmProvider::Anthropic, &self.anthropic_api_key, &self.anthropic_model)
                .or_else(|| pick(LlmProvider::Groq, &self.groq_api_key, &self.groq_model))
                .or_else(|| pick(LlmProvider::OpenAI, &self.openai_api_key, &self.openai_model)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(openai: bool, anthropic: bool, groq: bool) -> LlmConfig {
        LlmConfig {
            openai_api_key: openai.then(|| "o".to_string()),
            anthropic_api_key: anthropic.then(|| "a".to_string()),
            groq_api_key: groq.then(|| "g".to_string()),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_auto_prefers_anthropic_then_groq() {
        let r = keys(true, true, true).resolve_provider().unwrap();
        assert_eq!(r.provider, LlmProvider::Anthropic);
        assert_eq!(r.base_url, "https://api.anthropic.com/v1");

        let r = keys(true, false, true).resolve_provider().unwrap();
        assert_eq!(r.provider, LlmProvider::Groq);
        assert_eq!(r.model, DEFAULT_GROQ_MODEL);

        assert!(keys(false, false, false).resolve_provider().is_none());
    }

    #[test]
    fn test_explicit_preference_and_base_url() {
        let mut config = keys(true, true, false);
        config.preferred_provider = "openai".into();
        config.base_url = Some("http://localhost:8080/v1".into());
        let r = config.resolve_provider().unwrap();
        assert_eq!(r.provider, LlmProvider::OpenAI);
        assert_eq!(r.base_url, "http://localhost:8080/v1");

        config.preferred_provider = "groq".into();
        assert!(config.resolve_provider().is_none());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llm-config.json");
        std::fs::write(
            &path,
            r#"{"preferred_provider":"groq","groq_api_key":"gk","groq_model":"llama-3.1-8b-instant"}"#,
        )
        .unwrap();

        let config = LlmConfig::load(&path);
        let r = config.resolve_provider().unwrap();
        assert_eq!(r.provider, LlmProvider::Groq);
        assert_eq!(r.model, "llama-3.1-8b-instant");
        assert_eq!(r.api_key, "gk");
    }
}
