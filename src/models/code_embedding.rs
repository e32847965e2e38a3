use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct CodeEmbedding {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub project_id: String,
    pub repository_name: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub language: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[builder(default = Utc::now())]
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeSearchFilters {
    pub repository_name: Option<String>,
    pub language: Option<String>,
    /// Regex against `file_path`.
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeSearchHit {
    pub embedding: CodeEmbedding,
    pub score: f32,
}
