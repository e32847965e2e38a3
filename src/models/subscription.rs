use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    JobCreated,
    JobStarted,
    JobProgress,
    JobCompleted,
    JobFailed,
    JobRetrying,
    JobStalled,
    QueuePaused,
    QueueResumed,
}

impl LifecycleEvent {
    pub fn name(self) -> &'static str {
        match self {
            LifecycleEvent::JobCreated => "job.created",
            LifecycleEvent::JobStarted => "job.started",
            LifecycleEvent::JobProgress => "job.progress",
            LifecycleEvent::JobCompleted => "job.completed",
            LifecycleEvent::JobFailed => "job.failed",
            LifecycleEvent::JobRetrying => "job.retrying",
            LifecycleEvent::JobStalled => "job.stalled",
            LifecycleEvent::QueuePaused => "queue.paused",
            LifecycleEvent::QueueResumed => "queue.resumed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionFilters {
    /// Empty or containing `"*"` matches every queue.
    #[serde(default)]
    pub queues: Vec<String>,
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TypedBuilder)]
pub struct RetryConfig {
    #[builder(default = 3)]
    pub max_attempts: u32,
    #[builder(default = 2.0)]
    pub backoff_multiplier: f64,
    #[builder(default = 1000)]
    pub initial_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
}

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Subscription {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub application_id: String,
    pub url: String,
    #[builder(default = HttpMethod::Post)]
    pub method: HttpMethod,
    pub events: Vec<LifecycleEvent>,
    #[builder(default)]
    pub filters: SubscriptionFilters,
    pub secret: String,
    #[builder(default = RetryConfig::builder().build())]
    pub retry_config: RetryConfig,
    #[builder(default = true)]
    pub active: bool,
    #[builder(default = 0)]
    pub failure_count: u32,
    #[builder(default)]
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// Failures that counted toward `failure_count`, used to evaluate the
    /// "10 failures / 24h" auto-deactivation window.
    #[builder(default)]
    pub recent_failures: Vec<DateTime<Utc>>,
}

/// Generates a random 32-byte hex-encoded HMAC secret for a new subscription.
pub fn generate_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl Subscription {
    /// AND across keys, OR within list values; queues/statuses use `*` or
    /// membership, metadata uses per-key equality.
    pub fn matches(&self, event: LifecycleEvent, queue: &str, status: &str, metadata: &HashMap<String, String>) -> bool {
        if !self.active {
            return false;
        }
        if !self.events.contains(&event) {
            return false;
        }
        let queue_ok = self.filters.queues.is_empty()
            || self.filters.queues.iter().any(|q| q == "*" || q == queue);
        if !queue_ok {
            return false;
        }
        let status_ok = self.filters.statuses.is_empty() || self.filters.statuses.iter().any(|s| s == status);
        if !status_ok {
            return false;
        }
        self.filters
            .metadata
            .iter()
            .all(|(k, v)| metadata.get(k).map_or(false, |actual| actual == v))
    }

    /// Whether `failure_count` crosses the 10-failures-in-24h auto
    /// deactivation threshold, evaluated against a rolling 24h window of
    /// timestamps rather than a lifetime counter.
    pub fn should_deactivate(&self, now: DateTime<Utc>) -> bool {
        let window_start = now - chrono::Duration::hours(24);
        self.recent_failures.iter().filter(|t| **t >= window_start).count() >= 10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub() -> Subscription {
        Subscription::builder()
            .application_id("tenant-a".into())
            .url("https://example.com/hook".into())
            .events(vec![LifecycleEvent::JobCompleted])
            .secret("s".into())
            .build()
    }

    #[test]
    fn matches_wildcard_queue() {
        let s = sub();
        assert!(s.matches(LifecycleEvent::JobCompleted, "email", "completed", &HashMap::new()));
    }

    #[test]
    fn filters_and_across_keys() {
        let mut s = sub();
        s.filters.queues = vec!["email".into()];
        s.filters.metadata.insert("region".into(), "us".into());
        let mut md = HashMap::new();
        md.insert("region".into(), "eu".into());
        assert!(!s.matches(LifecycleEvent::JobCompleted, "email", "completed", &md));
    }

    #[test]
    fn deactivation_threshold() {
        let mut s = sub();
        let now = Utc::now();
        s.recent_failures = (0..10).map(|_| now).collect();
        assert!(s.should_deactivate(now));
    }
}
