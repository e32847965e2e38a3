use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::queue::JobOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
    Paused,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    pub kind: String,
}

/// `data` is an opaque payload at the queue boundary — the dispatcher
/// never inspects it, only per-queue processors parse it. Modelled as a
/// structured JSON value rather than a typed enum per job kind.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub queue_name: String,
    pub data: serde_json::Value,
    #[builder(default)]
    pub options: JobOptions,
    #[builder(default = JobStatus::Waiting)]
    pub status: JobStatus,
    pub application_id: String,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub failed_at: Option<DateTime<Utc>>,
    #[builder(default = 0)]
    pub attempt_number: u32,
    #[builder(default = 0)]
    pub progress: u8,
    #[builder(default)]
    pub result: Option<serde_json::Value>,
    #[builder(default)]
    pub error: Option<JobError>,
}

impl Job {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Waiting => true,
            JobStatus::Delayed => self.options.delay_until.map_or(true, |t| t <= now),
            _ => false,
        }
    }

    pub fn set_progress(&mut self, pct: u8) {
        self.progress = pct.min(100);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_job_is_ready_immediately() {
        let job = Job::builder()
            .queue_name("email".into())
            .data(serde_json::json!({}))
            .application_id("tenant-a".into())
            .build();
        assert!(job.is_ready(Utc::now()));
    }

    #[test]
    fn delayed_job_is_not_ready_before_delay_until() {
        let mut options = JobOptions::default();
        options.delay_until = Some(Utc::now() + chrono::Duration::hours(1));
        let job = Job::builder()
            .queue_name("email".into())
            .data(serde_json::json!({}))
            .options(options)
            .status(JobStatus::Delayed)
            .application_id("tenant-a".into())
            .build();
        assert!(!job.is_ready(Utc::now()));
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Active.is_terminal());
    }
}
