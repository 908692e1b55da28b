//! Grounded answer synthesis over retrieval results.
//!
//! Results become numbered `[n]` source blocks in the prompt. An empty
//! result set short-circuits to a fixed answer without an LLM call.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use kbase_core::deadline::{bounded, DEFAULT_CALL_TIMEOUT};
use kbase_core::{Result, RetrievalResult, ScoredChunk};

use crate::types::{ChatCompleter, ChatMessage, ChatUsage};

pub const NO_RELEVANT_INFORMATION: &str =
    "No relevant information was found in the knowledge base to answer this question.";

const SYSTEM_PROMPT: &str = "You answer questions using only the numbered sources provided. \
Cite sources inline as [n]. If the sources do not contain the answer, say that you could not find it.";

const EXCERPT_CHARS: usize = 200;

/// One source block the answer may cite.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    /// 1-based `[n]` label used in the prompt.
    pub index: usize,
    pub chunk_id: String,
    pub document_id: String,
    pub score: f64,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

impl Answer {
    pub fn no_relevant_information() -> Self {
        Self {
            answer: NO_RELEVANT_INFORMATION.into(),
            sources: Vec::new(),
            model: None,
            usage: None,
        }
    }
}

pub struct AnswerSynthesizer {
    chat: Arc<dyn ChatCompleter>,
    temperature: f64,
    max_tokens: usize,
    timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(chat: Arc<dyn ChatCompleter>) -> Self {
        Self {
            chat,
            temperature: 0.2,
            max_tokens: 1024,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub async fn answer(&self, question: &str, retrieval: &RetrievalResult) -> Result<Answer> {
        if retrieval.is_empty() {
            info!("No retrieval results, returning fixed answer");
            return Ok(Answer::no_relevant_information());
        }

        let context = build_context(&retrieval.results);
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("Sources:\n\n{context}\n\nQuestion: {question}")),
        ];
        debug!(sources = retrieval.results.len(), "synthesizing answer");

        let completion = bounded(
            "answer synthesis",
            self.timeout,
            self.chat
                .chat_complete(&messages, None, self.temperature, self.max_tokens),
        )
        .await?;

        Ok(Answer {
            answer: completion.content.trim().to_string(),
            sources: source_refs(&retrieval.results),
            model: Some(completion.model),
            usage: Some(completion.usage),
        })
    }
}

/// `[n] (document: id)` header followed by the chunk text, blank-line separated.
pub fn build_context(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] (document: {})\n{}", i + 1, c.document_id, c.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn source_refs(results: &[ScoredChunk]) -> Vec<SourceRef> {
    results
        .iter()
        .enumerate()
        .map(|(i, c)| SourceRef {
            index: i + 1,
            chunk_id: c.id.clone(),
            document_id: c.document_id.clone(),
            score: c.current_score(),
            excerpt: c.content.chars().take(EXCERPT_CHARS).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::types::ChatCompletion;

    #[derive(Default)]
    struct EchoChat {
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl ChatCompleter for EchoChat {
        async fn chat_complete(
            &self,
            messages: &[ChatMessage],
            _model: Option<&str>,
            _temperature: f64,
            _max_tokens: usize,
        ) -> Result<ChatCompletion> {
            self.seen.lock().unwrap().extend(messages.iter().cloned());
            Ok(ChatCompletion {
                content: " Chunks are bounded substrings [1]. ".into(),
                model: "echo".into(),
                usage: ChatUsage::default(),
            })
        }

        fn default_model(&self) -> &str {
            "echo"
        }
    }

    struct FailingChat;

    #[async_trait]
    impl ChatCompleter for FailingChat {
        async fn chat_complete(
            &self,
            _messages: &[ChatMessage],
            _model: Option<&str>,
            _temperature: f64,
            _max_tokens: usize,
        ) -> Result<ChatCompletion> {
            panic!("must not be called for empty results");
        }

        fn default_model(&self) -> &str {
            "failing"
        }
    }

    fn retrieval(results: Vec<ScoredChunk>) -> RetrievalResult {
        RetrievalResult {
            results,
            query: "what is a chunk".into(),
            took_ms: 3,
        }
    }

    #[test]
    fn test_build_context_numbers_sources() {
        let results = vec![
            ScoredChunk::semantic_hit("c1", "d1", "first text", 0.9),
            ScoredChunk::semantic_hit("c2", "d2", "  second text\n", 0.5),
        ];
        assert_eq!(
            build_context(&results),
            "[1] (document: d1)\nfirst text\n\n[2] (document: d2)\nsecond text"
        );
    }

    #[tokio::test]
    async fn test_empty_results_short_circuit() {
        let synth = AnswerSynthesizer::new(Arc::new(FailingChat));
        let answer = synth.answer("anything", &retrieval(Vec::new())).await.unwrap();
        assert_eq!(answer.answer, NO_RELEVANT_INFORMATION);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn test_answer_carries_sources() {
        let chat = Arc::new(EchoChat::default());
        let synth = AnswerSynthesizer::new(chat.clone());
        let results = vec![ScoredChunk::keyword_hit("c1", "d1", "A chunk is a bounded substring.", 0.7)];

        let answer = synth.answer("what is a chunk", &retrieval(results)).await.unwrap();
        assert_eq!(answer.answer, "Chunks are bounded substrings [1].");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].index, 1);
        assert_eq!(answer.sources[0].score, 0.7);
        assert_eq!(answer.model.as_deref(), Some("echo"));

        let seen = chat.seen.lock().unwrap();
        assert_eq!(seen[0].role, "system");
        assert!(seen[1].content.contains("[1] (document: d1)"));
        assert!(seen[1].content.ends_with("Question: what is a chunk"));
    }
}
