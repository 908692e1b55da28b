//! kbase core: error taxonomy, configuration, shared types, collaborator traits.

pub mod config;
pub mod deadline;
pub mod error;
pub mod scoring;
pub mod traits;
pub mod types;

pub use config::{ChunkingOptions, DataPaths, KbaseConfig, RetrievalWeights};
pub use error::{Error, Result};
pub use traits::{KeywordSearch, VectorSearch};
pub use types::*;
