//! The embedding seam used by the indexer.

use crate::error::EmbeddingError;

/// A unit-length vector for one chunk of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Scales `values` to unit length. An all-zero vector is kept as is.
    pub fn new(mut values: Vec<f32>) -> Self {
        let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            values.iter_mut().for_each(|x| *x /= norm);
        }
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Dot product of two unit vectors; 0.0 when the dimensions differ.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.dimension() != other.dimension() {
            return 0.0;
        }
        self.values.iter().zip(&other.values).map(|(a, b)| a * b).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Hub repository id, e.g. "sentence-transformers/all-MiniLM-L6-v2"
    pub name: String,
    pub dimension: usize,
    /// Input is truncated to this many tokens
    pub max_sequence_length: usize,
}

/// Turns text into vectors. One instance is shared across concurrent ingests.
pub trait EmbeddingModel: Send + Sync {
    fn info(&self) -> &ModelInfo;

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// One vector per input, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let borrowed: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.embed_batch(&borrowed)
    }
}
