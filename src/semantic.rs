//! Semantic indexing over plaintext a caller chose to expose.
//!
//! Nothing here reads from the store. Callers retrieve a source through the
//! authorization path first and index whatever text they decide to share.

use std::collections::BTreeMap;

use ring::digest;
use serde::{Deserialize, Serialize};

/// Embedding dimension used by [`HashingEmbedding`].
pub const EMBEDDING_DIM: usize = 384;

/// Text → vector, plus a similarity score in `[-1, 1]`.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str, language: &str) -> Vec<f32>;

    /// Cosine similarity. Zero when either vector has zero norm or the
    /// lengths differ.
    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine(a, b)
    }
}

/// Cosine similarity clamped to `[-1, 1]`; zero for mismatched lengths or
/// zero vectors.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Deterministic feature hashing: each lower-cased token adds ±1 to one
/// bucket chosen by its SHA-256. A placeholder for a real language model;
/// texts sharing words score higher, nothing more.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashingEmbedding;

impl EmbeddingProvider for HashingEmbedding {
    fn embed(&self, text: &str, _language: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; EMBEDDING_DIM];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = digest::digest(&digest::SHA256, token.to_lowercase().as_bytes());
            let bytes = hash.as_ref();
            let bucket = u16::from_be_bytes([bytes[0], bytes[1]]) as usize % EMBEDDING_DIM;
            let sign = if bytes[2] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

/// An embedded text plus the language it was embedded as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticIndex {
    pub vector: Vec<f32>,
    pub language: String,
    pub metadata: BTreeMap<String, String>,
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticMatch {
    /// Position of the matched index in the slice passed to `rank`.
    pub position: usize,
    pub score: f32,
    pub language: String,
}

/// Builds indexes and ranks them against a query.
pub struct SemanticMatcher {
    embedding: Box<dyn EmbeddingProvider>,
}

impl Default for SemanticMatcher {
    fn default() -> Self {
        Self::new(HashingEmbedding)
    }
}

impl SemanticMatcher {
    /// A matcher over a custom embedding provider.
    pub fn new(embedding: impl EmbeddingProvider + 'static) -> Self {
        Self {
            embedding: Box::new(embedding),
        }
    }

    /// Embed `content` for later ranking.
    pub fn index(&self, content: &str, language: &str) -> SemanticIndex {
        let mut metadata = BTreeMap::new();
        metadata.insert("length".to_string(), content.chars().count().to_string());
        SemanticIndex {
            vector: self.embedding.embed(content, language),
            language: language.to_string(),
            metadata,
        }
    }

    /// Score every index against `query`, best first.
    pub fn rank(&self, query: &str, indices: &[SemanticIndex]) -> Vec<SemanticMatch> {
        let query_vector = self.embedding.embed(query, "auto");
        let mut matches: Vec<SemanticMatch> = indices
            .iter()
            .enumerate()
            .map(|(position, index)| SemanticMatch {
                position,
                score: self.embedding.similarity(&query_vector, &index.vector),
                language: index.language.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches
    }
}
