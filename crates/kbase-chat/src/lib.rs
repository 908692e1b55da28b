//! kbase chat: chat-completion collaborator (OpenAI/Anthropic/Groq or
//! any compatible base URL) and grounded answer synthesis.

pub mod answer;
pub mod client;
pub mod config;
pub mod types;

pub use answer::{Answer, AnswerSynthesizer, SourceRef, NO_RELEVANT_INFORMATION};
pub use client::HttpChatClient;
pub use config::{LlmConfig, ResolvedProvider};
pub use types::*;
