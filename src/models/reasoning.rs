use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Analysis,
    Planning,
    Execution,
    Reflection,
    Error,
    Decision,
    Exploration,
    Validation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TypedBuilder)]
pub struct StepContent {
    pub raw: String,
    #[builder(default)]
    pub summary: Option<String>,
    #[builder(default = 0.5)]
    pub confidence: f32,
    #[builder(default)]
    pub keywords: Vec<String>,
    #[builder(default)]
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepContext {
    #[serde(default)]
    pub preceding_steps: Vec<u32>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub files_referenced: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub code_blocks: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StepQuality {
    pub clarity: f32,
    pub completeness: f32,
    pub usefulness: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct StepMetadata {
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,
    #[builder(default)]
    pub duration_ms: Option<u64>,
    #[builder(default)]
    pub token_count: Option<u32>,
    #[builder(default)]
    pub model: Option<String>,
    #[builder(default)]
    pub temperature: Option<f32>,
    #[builder(default)]
    pub max_tokens: Option<u32>,
}

/// Append-only; `step_number` is assigned by the reasoning store, not by
/// the caller (atomically, from the owning session's chain length).
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct ReasoningStep {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub session_id: Uuid,
    #[builder(default = 0)]
    pub step_number: u32,
    pub step_type: StepType,
    pub content: StepContent,
    #[builder(default)]
    pub context: StepContext,
    #[builder(default)]
    pub quality: StepQuality,
    #[builder(default = StepMetadata::builder().build())]
    pub metadata: StepMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningSearchFilters {
    pub session_id: Option<Uuid>,
    pub step_type: Option<StepType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningAnalysis {
    pub type_distribution: std::collections::HashMap<String, u32>,
    pub tool_usage: std::collections::HashMap<String, u32>,
    pub file_touch_histogram: std::collections::HashMap<String, u32>,
    pub average_quality: StepQuality,
    pub top_keywords: Vec<(String, u32)>,
    pub phase_sequence: Vec<StepType>,
}
