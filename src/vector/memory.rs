use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::VectorError;
use crate::models::code_embedding::{CodeSearchFilters, CodeSearchHit};
use crate::models::CodeEmbedding;

use super::{cosine_similarity, SearchOptions, VectorIndex};

/// Reference implementation used for local development and tests;
/// `numCandidates = limit * 10` fan-out is emulated by simply ranking the
/// whole (small, in-memory) candidate set.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    embeddings: DashMap<Uuid, CodeEmbedding>,
    dimension: std::sync::Mutex<Option<usize>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, embedding: CodeEmbedding) -> Result<(), VectorError> {
        let expected = *self.dimension.lock().unwrap();
        if let Some(expected) = expected {
            if embedding.embedding.len() != expected {
                return Err(VectorError::DimensionMismatch { expected, actual: embedding.embedding.len() });
            }
        } else {
            *self.dimension.lock().unwrap() = Some(embedding.embedding.len());
        }
        self.embeddings.insert(embedding.id, embedding);
        Ok(())
    }

    async fn search(&self, query_embedding: &[f32], project_id: &str, filters: &CodeSearchFilters, options: SearchOptions) -> Result<Vec<CodeSearchHit>, VectorError> {
        let mut hits: Vec<CodeSearchHit> = self
            .embeddings
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| e.project_id == project_id)
            .filter(|e| filters.repository_name.as_ref().map_or(true, |r| &e.repository_name == r))
            .filter(|e| filters.language.as_ref().map_or(true, |l| &e.language == l))
            .filter(|e| match &filters.file_path {
                None => true,
                Some(pattern) => regex::Regex::new(pattern).map(|re| re.is_match(&e.file_path)).unwrap_or(false),
            })
            .map(|embedding| {
                let score = cosine_similarity(query_embedding, &embedding.embedding);
                CodeSearchHit { embedding, score }
            })
            .filter(|hit| hit.score >= options.score_threshold)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(options.limit);
        Ok(hits)
    }

    async fn delete_repository_embeddings(&self, project_id: &str, repository_name: &str) -> Result<u64, VectorError> {
        let to_remove: Vec<Uuid> = self
            .embeddings
            .iter()
            .filter(|e| e.project_id == project_id && e.repository_name == repository_name)
            .map(|e| *e.key())
            .collect();
        let count = to_remove.len() as u64;
        for id in to_remove {
            self.embeddings.remove(&id);
        }
        Ok(count)
    }

    async fn ensure_vector_index(&self, dimension: usize) -> Result<(), VectorError> {
        let mut current = self.dimension.lock().unwrap();
        if current.is_none() {
            *current = Some(dimension);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CodeEmbedding;

    fn embedding(project: &str, repo: &str, v: Vec<f32>) -> CodeEmbedding {
        CodeEmbedding::builder()
            .project_id(project.to_string())
            .repository_name(repo.to_string())
            .file_path("src/lib.rs".to_string())
            .start_line(1)
            .end_line(10)
            .language("rust".to_string())
            .content("fn main() {}".to_string())
            .embedding(v)
            .build()
    }

    #[tokio::test]
    async fn search_filters_by_repository_and_threshold() {
        let index = InMemoryVectorIndex::new();
        index.upsert(embedding("p1", "A", vec![1.0, 0.0])).await.unwrap();
        index.upsert(embedding("p1", "B", vec![1.0, 0.0])).await.unwrap();
        index.upsert(embedding("p1", "A", vec![0.0, 1.0])).await.unwrap();

        let filters = CodeSearchFilters { repository_name: Some("A".to_string()), ..Default::default() };
        let hits = index.search(&[1.0, 0.0], "p1", &filters, SearchOptions::default()).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert!(hits.iter().all(|h| h.embedding.repository_name == "A"));
        assert!(hits.iter().all(|h| h.score >= 0.7));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let index = InMemoryVectorIndex::new();
        index.upsert(embedding("p1", "A", vec![1.0, 0.0, 0.0])).await.unwrap();
        let result = index.upsert(embedding("p1", "A", vec![1.0, 0.0])).await;
        assert!(matches!(result, Err(VectorError::DimensionMismatch { expected: 3, actual: 2 })));
    }
}
