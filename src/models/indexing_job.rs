use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexingJobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl IndexingJobStatus {
    pub fn is_cancellable(self) -> bool {
        matches!(self, IndexingJobStatus::Pending | IndexingJobStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TypedBuilder)]
pub struct IndexingOptions {
    #[builder(default = false)]
    pub incremental: bool,
    #[builder(default)]
    pub max_files: Option<u32>,
    #[builder(default = 200)]
    pub chunk_size: u32,
    #[builder(default = 20)]
    pub chunk_overlap: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexingProgress {
    pub files_scanned: u32,
    pub files_indexed: u32,
    pub chunks_indexed: u32,
    pub files_skipped: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct IndexingJob {
    #[builder(default = Uuid::new_v4())]
    pub job_id: Uuid,
    pub project_id: String,
    pub repository_name: String,
    pub branch: String,
    #[builder(default)]
    pub progress: IndexingProgress,
    #[builder(default = IndexingOptions::builder().build())]
    pub options: IndexingOptions,
    #[builder(default = IndexingJobStatus::Pending)]
    pub status: IndexingJobStatus,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub completed_at: Option<DateTime<Utc>>,
}
