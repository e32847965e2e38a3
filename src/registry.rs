//! C2 — queue registry: declared queues with default job options, lazy
//! creation of ad-hoc queues with service-wide defaults.

use dashmap::DashMap;

use crate::models::{is_valid_queue_name, JobOptions, Queue, RemovalPolicy};

fn service_wide_defaults() -> JobOptions {
    let mut opts = JobOptions::default();
    opts.remove_on_complete = Some(RemovalPolicy { age_sec: Some(3600), max_count: Some(1000) });
    opts.remove_on_fail = Some(RemovalPolicy { age_sec: Some(86_400), max_count: Some(5000) });
    opts
}

/// Process-wide; mutated only at startup (declared queues) and on ad-hoc
/// creation, guarded by the map's internal sharded locks.
pub struct QueueRegistry {
    queues: DashMap<String, Queue>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self { queues: DashMap::new() }
    }

    /// Pre-registers a declared queue. Idempotent: re-declaring the same
    /// name overwrites its defaults.
    pub fn declare(&self, queue: Queue) {
        self.queues.insert(queue.name.clone(), queue);
    }

    /// Returns the queue, auto-creating it with service-wide defaults if
    /// it doesn't exist yet (and the name is well-formed).
    pub fn get_or_create(&self, name: &str) -> Option<Queue> {
        if !is_valid_queue_name(name) {
            return None;
        }
        if let Some(queue) = self.queues.get(name) {
            return Some(queue.clone());
        }
        let queue = Queue::builder().name(name.to_string()).default_job_options(service_wide_defaults()).build();
        self.queues.insert(name.to_string(), queue.clone());
        Some(queue)
    }

    pub fn get(&self, name: &str) -> Option<Queue> {
        self.queues.get(name).map(|q| q.clone())
    }

    pub fn set_paused(&self, name: &str, paused: bool) {
        if let Some(mut queue) = self.queues.get_mut(name) {
            queue.paused = paused;
        }
    }

    pub fn list(&self) -> Vec<Queue> {
        self.queues.iter().map(|e| e.value().clone()).collect()
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pre-declares the queues named in the reference deployment ("email":
/// attempts=3, exponential 2s; "webhook": attempts=5, exponential 5s).
pub fn with_default_queues() -> QueueRegistry {
    let registry = QueueRegistry::new();
    registry.declare(
        Queue::builder()
            .name("email".to_string())
            .default_job_options(
                JobOptions::builder()
                    .attempts(3)
                    .backoff(crate::models::queue::Backoff::builder().kind(crate::models::BackoffKind::Exponential).base_delay_ms(2000).build())
                    .build(),
            )
            .build(),
    );
    registry.declare(
        Queue::builder()
            .name("webhook".to_string())
            .default_job_options(
                JobOptions::builder()
                    .attempts(5)
                    .backoff(crate::models::queue::Backoff::builder().kind(crate::models::BackoffKind::Exponential).base_delay_ms(5000).build())
                    .build(),
            )
            .build(),
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_queue_auto_creates_with_service_defaults() {
        let registry = QueueRegistry::new();
        let queue = registry.get_or_create("ad-hoc").unwrap();
        assert_eq!(queue.default_job_options.remove_on_complete.unwrap().max_count, Some(1000));
    }

    #[test]
    fn invalid_queue_name_is_rejected() {
        let registry = QueueRegistry::new();
        assert!(registry.get_or_create("Not Valid!").is_none());
    }

    #[test]
    fn declared_queue_keeps_its_own_defaults() {
        let registry = with_default_queues();
        let email = registry.get("email").unwrap();
        assert_eq!(email.default_job_options.attempts, 3);
    }
}
