use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VectorError;

/// External embedding provider boundary: `embed(text) -> float-vector`
/// with a fixed dimension `D`.
#[async_trait]
pub trait BaseEmbeddingService: Send + Sync {
    async fn generate(&self, text: &str) -> Result<Vec<f32>, VectorError>;
    fn dimension(&self) -> usize;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbeddingService {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingService {
    pub fn new(api_key: String, model: String, dimension: usize) -> Self {
        Self { client: reqwest::Client::new(), api_key, model, dimension }
    }
}

#[async_trait]
impl BaseEmbeddingService for OpenAiEmbeddingService {
    async fn generate(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest { input: text, model: &self.model })
            .send()
            .await
            .map_err(|e| VectorError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VectorError::Provider(format!("embedding provider returned {}", response.status())));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| VectorError::Provider(e.to_string()))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| VectorError::Provider("empty embedding response".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a live OPENAI_API_KEY"]
    async fn generates_embedding_of_expected_dimension() {
        let api_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set for this test");
        let service = OpenAiEmbeddingService::new(api_key, "text-embedding-3-small".to_string(), 1536);
        let embedding = service.generate("fn main() {}").await.unwrap();
        assert_eq!(embedding.len(), 1536);
    }
}
