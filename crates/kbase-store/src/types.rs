//! Rows and inputs for the store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use kbase_core::{Metadata, TextChunk};

/// Hex SHA-256 of a document body.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// A document row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub organisation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content_hash: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub chunk_count: usize,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Document fields written on every (re-)sync.
#[derive(Debug, Clone, Default)]
pub struct DocumentInput {
    pub id: String,
    pub organisation_id: String,
    pub title: Option<String>,
    pub content_hash: String,
    pub metadata: Metadata,
}

/// A chunk plus its embedding, ready to persist.
#[derive(Debug, Clone)]
pub struct ChunkInput {
    pub chunk: TextChunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
    pub embeddings: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_hex() {
        let h = content_hash("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, content_hash("hello"));
        assert_ne!(h, content_hash("hello "));
    }
}
