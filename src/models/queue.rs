use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Exponential,
    Fixed,
    Linear,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TypedBuilder)]
pub struct Backoff {
    pub kind: BackoffKind,
    pub base_delay_ms: u64,
    #[builder(default)]
    pub max_delay_ms: Option<u64>,
}

impl Backoff {
    /// Delay before the next attempt, per the dispatcher's backoff design:
    /// exponential `min(base * 2^(attempt-1), max ?? 30min)`, fixed `base`,
    /// linear `base * attempt`. `attempt` is the attempt about to be made
    /// (1-indexed); jitter is applied by the caller.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        const DEFAULT_MAX_MS: u64 = 30 * 60 * 1000;
        let max = self.max_delay_ms.unwrap_or(DEFAULT_MAX_MS);
        let raw = match self.kind {
            BackoffKind::Exponential => {
                let exp = attempt.saturating_sub(1).min(32);
                self.base_delay_ms.saturating_mul(1u64 << exp)
            }
            BackoffKind::Fixed => self.base_delay_ms,
            BackoffKind::Linear => self.base_delay_ms.saturating_mul(attempt as u64),
        };
        raw.min(max)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TypedBuilder)]
pub struct RemovalPolicy {
    #[builder(default)]
    pub age_sec: Option<u64>,
    #[builder(default)]
    pub max_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct JobOptions {
    #[builder(default = 0)]
    pub priority: i32,
    #[builder(default)]
    pub delay_until: Option<chrono::DateTime<chrono::Utc>>,
    #[builder(default = 3)]
    pub attempts: u32,
    #[builder(default = Backoff::builder().kind(BackoffKind::Exponential).base_delay_ms(1000).build())]
    pub backoff: Backoff,
    #[builder(default = 30_000)]
    pub timeout_ms: u64,
    #[builder(default)]
    pub remove_on_complete: Option<RemovalPolicy>,
    #[builder(default)]
    pub remove_on_fail: Option<RemovalPolicy>,
}

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions::builder().build()
    }
}

/// Merges per-job overrides onto queue defaults; job overrides win on
/// every field that was explicitly set (here modelled as "always take the
/// job's value, having already inherited the queue default when the job
/// was constructed" — see `QueueRegistry::job_options_for`).
impl JobOptions {
    pub fn merge_defaults(job: &JobOptions, queue_default: &JobOptions) -> JobOptions {
        JobOptions {
            priority: job.priority,
            delay_until: job.delay_until,
            attempts: job.attempts,
            backoff: job.backoff,
            timeout_ms: job.timeout_ms,
            remove_on_complete: job.remove_on_complete.or(queue_default.remove_on_complete),
            remove_on_fail: job.remove_on_fail.or(queue_default.remove_on_fail),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimit {
    pub max: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Queue {
    pub name: String,
    #[builder(default)]
    pub default_job_options: JobOptions,
    #[builder(default)]
    pub paused: bool,
    #[builder(default)]
    pub rate_limit: Option<RateLimit>,
}

/// `[a-z0-9_-]{1,64}`.
pub fn is_valid_queue_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let b = Backoff::builder().kind(BackoffKind::Exponential).base_delay_ms(100).max_delay_ms(Some(1000)).build();
        assert_eq!(b.delay_ms(1), 100);
        assert_eq!(b.delay_ms(2), 200);
        assert_eq!(b.delay_ms(3), 400);
        assert_eq!(b.delay_ms(10), 1000);
    }

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let b = Backoff::builder().kind(BackoffKind::Linear).base_delay_ms(50).build();
        assert_eq!(b.delay_ms(3), 150);
    }

    #[test]
    fn queue_name_validation() {
        assert!(is_valid_queue_name("email"));
        assert!(is_valid_queue_name("webhook-delivery_2"));
        assert!(!is_valid_queue_name("Email"));
        assert!(!is_valid_queue_name(""));
        assert!(!is_valid_queue_name(&"a".repeat(65)));
    }
}
