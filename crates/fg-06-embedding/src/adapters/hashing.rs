//! # Hashing Embedder
//!
//! Deterministic bag-of-words embedding with no model behind it.
//!
//! Text is lower-cased and split on non-alphanumeric characters. Each token
//! is hashed with SHA-256; the first eight digest bytes pick a bucket and
//! the ninth picks a sign. The vector is then L2-normalised, so the dot
//! product of two vectors is their cosine similarity.

use crate::ports::{EmbedError, Embedder};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

pub const DEFAULT_DIMENSION: usize = 768;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingEmbedder {
    /// A zero dimension is raised to one.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Embed synchronously.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0.0_f32; self.dimension];
        let mut tokens = 0usize;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            // Bucket count is far below u64::MAX, so the cast back is lossless.
            let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
            tokens += 1;
        }

        if tokens == 0 {
            return Err(EmbedError::EmptyInput);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_text(text)
    }
}
