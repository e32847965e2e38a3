use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Errored,
    Abandoned,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    pub working_directory: Option<String>,
    pub git_branch: Option<String>,
    pub git_commit: Option<String>,
    #[serde(default)]
    pub active_files: Vec<String>,
    #[serde(default)]
    pub modified_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct SessionStatistics {
    #[builder(default = Utc::now())]
    pub start_time: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub last_activity: DateTime<Utc>,
    #[builder(default = 0)]
    pub total_duration_ms: u64,
    #[builder(default = 0)]
    pub reasoning_steps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Owns its reasoning chain by length counter rather than a list of step
/// ids, to avoid unbounded document growth (steps hold `session_id`,
/// never the reverse).
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Session {
    #[builder(default = Uuid::new_v4())]
    pub session_id: Uuid,
    pub project_id: String,
    #[builder(default = SessionStatus::Active)]
    pub status: SessionStatus,
    #[builder(default)]
    pub context: SessionContext,
    #[builder(default = SessionStatistics::builder().build())]
    pub statistics: SessionStatistics,
    #[builder(default)]
    pub chain_length: u32,
    #[builder(default)]
    pub checkpoints: Vec<Checkpoint>,
}

impl Session {
    pub fn touch(&mut self) {
        self.statistics.last_activity = Utc::now();
    }
}
