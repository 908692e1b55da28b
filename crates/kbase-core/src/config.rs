//! Configuration: chunking options, retrieval weights and service settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 512;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
pub const DEFAULT_SENTENCES_PER_CHUNK: usize = 3;
pub const DEFAULT_SEMANTIC_WEIGHT: f64 = 0.7;
pub const DEFAULT_KEYWORD_WEIGHT: f64 = 0.3;

/// Paragraph, line, sentence, word, character.
pub fn default_separators() -> Vec<String> {
    ["\n\n", "\n", ". ", " ", ""].iter().map(|s| s.to_string()).collect()
}

/// Options shared by every chunking strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkingOptions {
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Characters carried over from the previous chunk.
    pub chunk_overlap: usize,
    /// Tried in order; the empty string means "split into characters".
    pub separators: Vec<String>,
    pub preserve_whitespace: bool,
    /// Only used by the sentence splitter.
    pub sentences_per_chunk: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: default_separators(),
            preserve_whitespace: false,
            sentences_per_chunk: DEFAULT_SENTENCES_PER_CHUNK,
        }
    }
}

impl ChunkingOptions {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        }
    }

    pub fn with_separators<S: Into<String>>(mut self, separators: impl IntoIterator<Item = S>) -> Self {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Size/overlap presets keyed on a file extension such as `".rs"` or `"md"`.
    pub fn for_extension(extension: Option<&str>) -> Self {
        const CODE: &[&str] = &["py", "js", "java", "cpp", "c", "go", "rs", "ts", "tsx", "jsx"];
        const PROSE: &[&str] = &["md", "mdx", "rst", "tex", "txt", "html"];

        let ext = extension
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .unwrap_or_default();
        if CODE.contains(&ext.as_str()) {
            Self::new(400, 80)
        } else if PROSE.contains(&ext.as_str()) {
            Self::new(600, 120)
        } else {
            Self::default()
        }
    }

    /// Reject options that would loop or produce nonsense.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidInput("chunk_size must be greater than 0".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidInput(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separators.is_empty() {
            return Err(Error::InvalidInput("separators must not be empty".into()));
        }
        if self.sentences_per_chunk == 0 {
            return Err(Error::InvalidInput(
                "sentences_per_chunk must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Weights for score fusion. They need not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalWeights {
    pub keyword_weight: f64,
    pub semantic_weight: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
        }
    }
}

impl RetrievalWeights {
    pub fn new(semantic_weight: f64, keyword_weight: f64) -> Self {
        Self {
            keyword_weight,
            semantic_weight,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, w) in [("keyword_weight", self.keyword_weight), ("semantic_weight", self.semantic_weight)] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidInput(format!("{name} must be a non-negative number, got {w}")));
            }
        }
        Ok(())
    }
}

/// Paths to kbase data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    pub root: PathBuf,
    /// SQLite store directory (`data/store/`).
    pub store: PathBuf,
    /// LLM configuration (`data/llm-config.json`).
    pub llm_config_file: PathBuf,
}

impl DataPaths {
    /// Create data paths under `root`, creating directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            store: root.join("store"),
            llm_config_file: root.join("llm-config.json"),
            root,
        };
        std::fs::create_dir_all(&paths.store)?;
        Ok(paths)
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbaseConfig {
    pub port: u16,
    pub data_paths: DataPaths,
    /// Dimension of the local fallback embedder.
    pub embedding_dim: usize,
    /// Bound on every external call.
    pub call_timeout_secs: u64,
    pub chunking: ChunkingOptions,
    pub weights: RetrievalWeights,
    /// Rerank stage names, run in order after fusion.
    pub rerank_stages: Vec<String>,
}

impl KbaseConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_paths = DataPaths::new(data_dir)?;

        let chunking = ChunkingOptions::new(
            env_or("KBASE_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            env_or("KBASE_CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP),
        );
        chunking
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let weights = RetrievalWeights::new(
            env_or("KBASE_SEMANTIC_WEIGHT", DEFAULT_SEMANTIC_WEIGHT),
            env_or("KBASE_KEYWORD_WEIGHT", DEFAULT_KEYWORD_WEIGHT),
        );
        weights.validate().map_err(|e| Error::Config(e.to_string()))?;

        let rerank_stages = std::env::var("KBASE_RERANK_STAGES")
            .unwrap_or_else(|_| "dedup".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            port: env_or("PORT", 3003),
            data_paths,
            embedding_dim: env_or("KBASE_EMBEDDING_DIM", 384),
            call_timeout_secs: env_or("KBASE_TIMEOUT_SECS", 30),
            chunking,
            weights,
            rerank_stages,
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        let opts = ChunkingOptions::default();
        assert_eq!(opts.chunk_size, 512);
        assert_eq!(opts.chunk_overlap, 50);
        assert_eq!(opts.separators, vec!["\n\n", "\n", ". ", " ", ""]);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = ChunkingOptions::new(100, 100).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(ChunkingOptions::new(0, 0).validate().is_err());
    }

    #[test]
    fn test_empty_separators_rejected() {
        let opts = ChunkingOptions::default().with_separators(Vec::<String>::new());
        assert!(matches!(opts.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_extension_presets() {
        assert_eq!(ChunkingOptions::for_extension(Some(".rs")).chunk_size, 400);
        assert_eq!(ChunkingOptions::for_extension(Some("MD")).chunk_overlap, 120);
        assert_eq!(ChunkingOptions::for_extension(None), ChunkingOptions::default());
    }

    #[test]
    fn test_weights_validation() {
        assert!(RetrievalWeights::default().validate().is_ok());
        assert!(RetrievalWeights::new(1.5, 2.0).validate().is_ok());
        assert!(RetrievalWeights::new(-0.1, 0.3).validate().is_err());
        assert!(RetrievalWeights::new(f64::NAN, 0.3).validate().is_err());
    }

    #[test]
    fn test_data_paths_created() {
        let dir = std::env::temp_dir().join(format!("kbase-config-{}", std::process::id()));
        let paths = DataPaths::new(&dir).unwrap();
        assert!(paths.store.exists());
        assert_eq!(paths.llm_config_file, dir.join("llm-config.json"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
