//! Deterministic local embedder.
//!
//! Signed feature hashing of lowercase words, L2-normalised. No model and
//! no network, so it backs development setups and tests. Texts sharing
//! words get positive cosine similarity.

use async_trait::async_trait;
use ndarray::Array1;
use sha2::{Digest, Sha256};

use kbase_core::{Error, Result};

use crate::embedder::{Embedder, Embedding};

pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidInput("embedding dimension must be greater than 0".into()));
        }
        Ok(Self { dim })
    }

    /// Synchronous core, also used by tests that need vectors directly.
    pub fn vectorize(&self, text: &str) -> Embedding {
        let mut v = Array1::<f32>::zeros(self.dim);
        let mut tokens = 0;

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            tokens += 1;
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dim as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[index] += sign;
        }

        let norm = v.dot(&v).sqrt();
        if norm > 0.0 {
            v /= norm;
        }
        Embedding {
            embedding: v.to_vec(),
            tokens,
        }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
