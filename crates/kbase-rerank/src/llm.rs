//! LLM rerank: one prompt, one JSON array of 1-10 relevance scores.
//!
//! Any failure (transport, timeout, unparseable reply, wrong length) is
//! logged and the candidates come back in their incoming order.

use std::time::Duration;

use tracing::{debug, warn};

use kbase_chat::{ChatCompleter, ChatMessage};
use kbase_core::deadline::bounded;
use kbase_core::scoring::sort_by_score_desc;
use kbase_core::{Error, Result, ScoreStage, ScoredChunk};

use crate::types::{LlmRerank, MAX_LLM_CANDIDATES};

const RERANK_TEMPERATURE: f64 = 0.0;
const RERANK_MAX_TOKENS: usize = 256;
/// Per-passage excerpt length in the prompt, in characters.
const PASSAGE_CHARS: usize = 1000;

const SYSTEM_PROMPT: &str = "You rate how relevant passages are to a search query. \
Reply with only a JSON array of integers from 1 (irrelevant) to 10 (highly relevant), \
one per passage, in the order the passages are given.";

/// Rerank the first `min(top_k, 20)` candidates with a generative model.
/// Candidates past the cap follow unchanged. Never fails.
pub async fn rerank_by_llm(
    query: &str,
    candidates: Vec<ScoredChunk>,
    chat: &dyn ChatCompleter,
    top_k: usize,
    timeout: Duration,
) -> LlmRerank {
    let cap = top_k.min(MAX_LLM_CANDIDATES).min(candidates.len());
    if cap == 0 {
        return LlmRerank {
            results: candidates,
            degraded: false,
        };
    }

    let messages = [
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(build_prompt(query, &candidates[..cap])),
    ];

    let scores = match bounded(
        "llm rerank",
        timeout,
        chat.chat_complete(&messages, None, RERANK_TEMPERATURE, RERANK_MAX_TOKENS),
    )
    .await
    .and_then(|completion| parse_scores(&completion.content, cap))
    {
        Ok(scores) => scores,
        Err(e) => {
            warn!("LLM rerank skipped, keeping incoming order: {}", e);
            return LlmRerank {
                results: candidates,
                degraded: true,
            };
        }
    };

    let mut head = candidates;
    let tail = head.split_off(cap);
    for (candidate, score) in head.iter_mut().zip(scores) {
        candidate.push_score(ScoreStage::LlmRerank, score / 10.0);
    }
    sort_by_score_desc(&mut head);
    debug!(rescored = head.len(), passed_through = tail.len(), "llm rerank");
    head.extend(tail);

    LlmRerank {
        results: head,
        degraded: false,
    }
}

fn build_prompt(query: &str, candidates: &[ScoredChunk]) -> String {
    let mut prompt = format!("Query: {query}\n\nPassages:\n");
    for (i, candidate) in candidates.iter().enumerate() {
        let excerpt: String = candidate.content.chars().take(PASSAGE_CHARS).collect();
        prompt.push_str(&format!("[{}] {}\n\n", i + 1, excerpt.trim()));
    }
    prompt.push_str(&format!(
        "Return a JSON array of exactly {} integers.",
        candidates.len()
    ));
    prompt
}

/// Pull the first `[...]` out of `content` and read it as `expected`
/// integer scores in `[1, 10]`.
fn parse_scores(content: &str, expected: usize) -> Result<Vec<f64>> {
    let start = content
        .find('[')
        .ok_or_else(|| Error::Parse("no JSON array in rerank reply".into()))?;
    let end = content[start..]
        .find(']')
        .map(|i| start + i)
        .ok_or_else(|| Error::Parse("unterminated JSON array in rerank reply".into()))?;

    let scores: Vec<f64> = serde_json::from_str(&content[start..=end])
        .map_err(|e| Error::Parse(format!("rerank scores: {e}")))?;

    if scores.len() != expected {
        return Err(Error::Parse(format!(
            "expected {expected} rerank scores, got {}",
            scores.len()
        )));
    }
    if let Some(bad) = scores.iter().find(|s| !(1.0..=10.0).contains(*s)) {
        return Err(Error::Parse(format!("rerank score out of range: {bad}")));
    }
    if let Some(bad) = scores.iter().find(|s| s.fract() != 0.0) {
        return Err(Error::Parse(format!("rerank score is not an integer: {bad}")));
    }
    Ok(scores)
}
