//! `Chunker`: validated options plus strategy dispatch.

use serde::{Deserialize, Serialize};
use tracing::debug;

use kbase_core::{ChunkResult, ChunkingOptions, Result};

use crate::{recursive, semantic, sentence};

/// Which splitter to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    Recursive,
    #[default]
    Semantic,
    Sentence,
}

impl std::str::FromStr for ChunkStrategy {
    type Err = kbase_core::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "recursive" => Ok(Self::Recursive),
            "semantic" => Ok(Self::Semantic),
            "sentence" => Ok(Self::Sentence),
            other => Err(kbase_core::Error::InvalidInput(format!(
                "unknown chunk strategy: {other}"
            ))),
        }
    }
}

/// Splits documents into chunks. Stateless apart from its options, so a
/// single instance can be shared across tasks.
#[derive(Debug, Clone)]
pub struct Chunker {
    options: ChunkingOptions,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            options: ChunkingOptions::default(),
        }
    }
}

impl Chunker {
    pub fn new(options: ChunkingOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &ChunkingOptions {
        &self.options
    }

    /// Recursive separator splitting with overlap.
    pub fn chunk(&self, text: &str) -> ChunkResult {
        let result = recursive::chunk(text, &self.options);
        debug!(
            chars = result.metadata.original_length,
            chunks = result.metadata.chunk_count,
            "recursive chunking"
        );
        result
    }

    /// Heading and blank-line aware splitting.
    pub fn chunk_semantic(&self, text: &str) -> ChunkResult {
        let result = semantic::chunk(text, &self.options);
        debug!(
            chars = result.metadata.original_length,
            chunks = result.metadata.chunk_count,
            "semantic chunking"
        );
        result
    }

    /// `sentences_per_chunk` sentences per chunk.
    pub fn chunk_by_sentence(&self, text: &str) -> ChunkResult {
        let result = sentence::chunk(text, &self.options);
        debug!(
            chars = result.metadata.original_length,
            chunks = result.metadata.chunk_count,
            "sentence chunking"
        );
        result
    }

    pub fn chunk_with(&self, strategy: ChunkStrategy, text: &str) -> ChunkResult {
        match strategy {
            ChunkStrategy::Recursive => self.chunk(text),
            ChunkStrategy::Semantic => self.chunk_semantic(text),
            ChunkStrategy::Sentence => self.chunk_by_sentence(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_overlap() {
        let err = Chunker::new(ChunkingOptions::new(10, 10)).unwrap_err();
        assert!(matches!(err, kbase_core::Error::InvalidInput(_)));
        assert!(Chunker::new(ChunkingOptions::new(0, 0)).is_err());
    }

    #[test]
    fn test_default_strategy_is_semantic() {
        assert_eq!(ChunkStrategy::default(), ChunkStrategy::Semantic);
        let parsed: ChunkStrategy = serde_json::from_str("\"sentence\"").unwrap();
        assert_eq!(parsed, ChunkStrategy::Sentence);
        assert_eq!("Recursive".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::Recursive);
        assert!("fixed".parse::<ChunkStrategy>().is_err());
    }

    #[test]
    fn test_chunk_with_dispatches() {
        let chunker = Chunker::default();
        let text = "First sentence. Second sentence. Third sentence. Fourth sentence.";
        let by_sentence = chunker.chunk_with(ChunkStrategy::Sentence, text);
        assert_eq!(by_sentence.chunks.len(), 2);
        let recursive = chunker.chunk_with(ChunkStrategy::Recursive, text);
        assert_eq!(recursive.chunks.len(), 1);
        assert_eq!(recursive.chunks[0].content, text);
    }

    #[test]
    fn test_extension_presets_validate() {
        for ext in [Some("rs"), Some(".md"), None] {
            assert!(Chunker::new(ChunkingOptions::for_extension(ext)).is_ok());
        }
    }
}
