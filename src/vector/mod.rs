//! C7 — vector search over code-chunk embeddings: ingest, cosine
//! similarity search with metadata filters, index maintenance.

pub mod embeddings;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::VectorError;
use crate::models::code_embedding::{CodeSearchFilters, CodeSearchHit};
use crate::models::CodeEmbedding;

pub use embeddings::{BaseEmbeddingService, OpenAiEmbeddingService};
pub use memory::InMemoryVectorIndex;

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub limit: usize,
    pub score_threshold: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { limit: 10, score_threshold: 0.7 }
    }
}

/// Storage for code-chunk embeddings. All embeddings under one index
/// share dimension `D` and the cosine similarity metric.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, embedding: CodeEmbedding) -> Result<(), VectorError>;

    async fn search(&self, query_embedding: &[f32], project_id: &str, filters: &CodeSearchFilters, options: SearchOptions) -> Result<Vec<CodeSearchHit>, VectorError>;

    async fn delete_repository_embeddings(&self, project_id: &str, repository_name: &str) -> Result<u64, VectorError>;

    /// Idempotent: a no-op if an index already exists with the given
    /// dimension.
    async fn ensure_vector_index(&self, dimension: usize) -> Result<(), VectorError>;
}

/// `1 - cosine_distance`, matching the reference pgvector `<=>` query
/// (`1 - (embedding <=> query) AS similarity`).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }
}
