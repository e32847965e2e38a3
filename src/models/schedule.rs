use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleTrigger {
    Cron { expression: String, timezone: String },
    At { at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct EndpointAction {
    pub url: String,
    #[builder(default = HttpMethod::Post)]
    pub method: HttpMethod,
    #[builder(default)]
    pub headers: HashMap<String, String>,
    #[builder(default)]
    pub body: Option<serde_json::Value>,
    #[builder(default = 30_000)]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TypedBuilder)]
pub struct RetryPolicy {
    #[builder(default = 3)]
    pub attempts: u32,
    #[builder(default = 1000)]
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Schedule {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub name: String,
    pub application_id: String,
    pub trigger: ScheduleTrigger,
    #[builder(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[builder(default)]
    pub limit: Option<u32>,
    pub endpoint: EndpointAction,
    #[builder(default = RetryPolicy::builder().build())]
    pub retry_policy: RetryPolicy,
    #[builder(default = true)]
    pub enabled: bool,
    pub created_by: String,
    #[builder(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub last_execution_status: Option<ExecutionStatus>,
    #[builder(default)]
    pub last_execution_error: Option<String>,
    #[builder(default)]
    pub next_execution_at: Option<DateTime<Utc>>,
    #[builder(default = 0)]
    pub execution_count: u32,
}

impl Schedule {
    /// Exactly one of `cron` or `at` is set; `at` carries implicit
    /// `limit = 1` semantics (disabled after firing once).
    pub fn is_one_shot(&self) -> bool {
        matches!(self.trigger, ScheduleTrigger::At { .. })
    }

    pub fn has_executions_remaining(&self) -> bool {
        match self.limit {
            Some(limit) => self.execution_count < limit,
            None => true,
        }
    }

    pub fn is_past_end_date(&self, now: DateTime<Utc>) -> bool {
        self.end_date.map_or(false, |end| now > end)
    }
}
