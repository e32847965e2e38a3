//! C3 — job dispatcher: per-queue worker pools, retry/backoff, removal
//! policy, state transitions. Grounded on the reference service's
//! Postgres-backed job queue, re-pointed at the broker's narrow
//! interface rather than talking to storage directly.

pub mod stalled;
pub mod worker;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::instrument;
use uuid::Uuid;

use crate::broker::{Broker, QueueCounts};
use crate::error::{BrokerError, DispatchError};
use crate::events::{EventBus, JobLifecycleEvent};
use crate::models::subscription::LifecycleEvent;
use crate::models::{Job, JobOptions, JobStatus};
use crate::registry::QueueRegistry;

/// User-supplied work for a queue. The dispatcher never inspects
/// `job.data`; only the handler registered for a queue parses it.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job, cancel: tokio_util::sync::CancellationToken) -> Result<Value, String>;
}

#[derive(Clone, Default)]
pub struct Stats {
    pub counts: QueueCounts,
}

pub struct JobDispatcher {
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) registry: Arc<QueueRegistry>,
    pub(crate) events: Arc<EventBus>,
    handlers: DashMap<String, Arc<dyn JobHandler>>,
    worker_handles: DashMap<String, Vec<JoinHandle<()>>>,
    pub(crate) active_cancellations: DashMap<Uuid, tokio_util::sync::CancellationToken>,
    rate_windows: DashMap<String, Mutex<VecDeque<chrono::DateTime<Utc>>>>,
    shutdown: Arc<Notify>,
    default_timeout_ms: u64,
}

impl JobDispatcher {
    pub fn new(broker: Arc<dyn Broker>, registry: Arc<QueueRegistry>, events: Arc<EventBus>) -> Self {
        Self {
            broker,
            registry,
            events,
            handlers: DashMap::new(),
            worker_handles: DashMap::new(),
            active_cancellations: DashMap::new(),
            rate_windows: DashMap::new(),
            shutdown: Arc::new(Notify::new()),
            default_timeout_ms: 30_000,
        }
    }

    /// `Queue.rate_limit` is advisory at the enqueue boundary, not a hard
    /// cap on reservation throughput: a queue over its window rejects new
    /// submissions with `DispatchError::RateLimited` rather than blocking
    /// workers already draining it.
    fn check_rate_limit(&self, queue: &crate::models::Queue) -> Result<(), DispatchError> {
        let Some(limit) = queue.rate_limit else { return Ok(()) };
        let now = Utc::now();
        let window_start = now - chrono::Duration::milliseconds(limit.window_ms as i64);
        let entry = self.rate_windows.entry(queue.name.clone()).or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut window = entry.lock().expect("rate window mutex poisoned");
        while window.front().map_or(false, |t| *t < window_start) {
            window.pop_front();
        }
        if window.len() as u32 >= limit.max {
            return Err(DispatchError::RateLimited(queue.name.clone()));
        }
        window.push_back(now);
        Ok(())
    }

    pub fn register_handler(&self, queue_name: &str, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(queue_name.to_string(), handler);
    }

    #[instrument(skip(self, data, options), fields(queue_name = %queue_name))]
    pub async fn submit(
        &self,
        queue_name: &str,
        application_id: &str,
        data: Value,
        options: Option<JobOptions>,
    ) -> Result<Uuid, DispatchError> {
        let queue = self
            .registry
            .get_or_create(queue_name)
            .ok_or_else(|| DispatchError::Broker(BrokerError::QueueNotFound(queue_name.to_string())))?;
        self.check_rate_limit(&queue)?;
        let job_options = match options {
            Some(job_opts) => JobOptions::merge_defaults(&job_opts, &queue.default_job_options),
            None => queue.default_job_options.clone(),
        };
        let job = Job::builder()
            .queue_name(queue_name.to_string())
            .data(data)
            .options(job_options)
            .application_id(application_id.to_string())
            .build();
        let job_id = job.id;
        self.broker.push(job.clone()).await?;
        self.emit(&job, LifecycleEvent::JobCreated);
        Ok(job_id)
    }

    pub async fn status(&self, queue_name: &str, job_id: Uuid) -> Result<Option<Job>, DispatchError> {
        Ok(self.broker.find(queue_name, job_id).await?)
    }

    /// Waiting/delayed jobs are removed outright; active jobs are
    /// best-effort cancelled by signalling the processing worker's
    /// cancellation token (the broker lease still expires naturally if the
    /// worker doesn't stop promptly); terminal jobs are a no-op.
    pub async fn cancel(&self, queue_name: &str, job_id: Uuid) -> Result<(), DispatchError> {
        let Some(job) = self.broker.find(queue_name, job_id).await? else {
            return Ok(());
        };
        match job.status {
            JobStatus::Waiting | JobStatus::Delayed => {
                self.broker.remove(queue_name, job_id).await?;
            }
            JobStatus::Active => {
                if let Some(token) = self.active_cancellations.get(&job_id) {
                    token.cancel();
                }
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Paused => {}
        }
        Ok(())
    }

    pub async fn pause(&self, queue_name: &str) -> Result<(), DispatchError> {
        self.registry.set_paused(queue_name, true);
        self.broker.pause(queue_name).await?;
        Ok(())
    }

    pub async fn resume(&self, queue_name: &str) -> Result<(), DispatchError> {
        self.registry.set_paused(queue_name, false);
        self.broker.resume(queue_name).await?;
        Ok(())
    }

    pub async fn stats(&self, queue_name: &str) -> Result<QueueCounts, DispatchError> {
        Ok(self.broker.counts(queue_name).await?)
    }

    /// Bulk-removes terminal jobs older than `grace` for `status`
    /// (`Completed` or `Failed`), capped at `limit`.
    pub async fn clean(&self, queue_name: &str, grace: chrono::Duration, limit: usize, status: JobStatus) -> Result<usize, DispatchError> {
        if !status.is_terminal() {
            return Ok(0);
        }
        let cutoff = Utc::now() - grace;
        let jobs = self.broker.list_by_state(queue_name, status, 0, limit).await?;
        let mut removed = 0;
        for job in jobs {
            let completed_at = match status {
                JobStatus::Completed => job.completed_at,
                JobStatus::Failed => job.failed_at,
                _ => None,
            };
            if completed_at.map_or(false, |t| t < cutoff) {
                self.broker.remove(queue_name, job.id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn emit(&self, job: &Job, event: LifecycleEvent) {
        self.events.publish(JobLifecycleEvent {
            event,
            job_id: job.id,
            queue_name: job.queue_name.clone(),
            application_id: job.application_id.clone(),
            status: format!("{:?}", job.status).to_lowercase(),
            attempt_number: job.attempt_number,
            data: None,
            timestamp: Utc::now(),
        });
    }

    pub fn handler_for(&self, queue_name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(queue_name).map(|h| h.clone())
    }

    pub(crate) fn track_worker(&self, queue_name: &str, handle: JoinHandle<()>) {
        self.worker_handles.entry(queue_name.to_string()).or_default().push(handle);
    }

    pub fn shutdown_signal(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Signals every worker to stop reserving and waits up to
    /// `grace_ms` for in-flight jobs to finish.
    pub async fn shutdown(&self, grace_ms: u64) {
        self.shutdown.notify_waiters();
        let deadline = tokio::time::sleep(std::time::Duration::from_millis(grace_ms));
        tokio::pin!(deadline);
        let handles: Vec<JoinHandle<()>> = self.worker_handles.iter_mut().flat_map(|mut e| std::mem::take(e.value_mut())).collect();
        let joined = futures::future::join_all(handles.into_iter().map(|h| async move { let _ = h.await; }));
        tokio::select! {
            _ = joined => {}
            _ = &mut deadline => {}
        }
    }

    pub fn default_timeout_ms(&self) -> u64 {
        self.default_timeout_ms
    }
}

/// Per the backoff design: compute the next-attempt delay with ±20%
/// jitter applied unconditionally.
pub fn next_retry_delay_ms(options: &JobOptions, attempt: u32) -> u64 {
    crate::common::time::jitter(options.backoff.delay_ms(attempt))
}

pub type QueueStats = HashMap<String, QueueCounts>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;

    fn dispatcher() -> JobDispatcher {
        JobDispatcher::new(Arc::new(InMemoryBroker::new()), Arc::new(QueueRegistry::new()), Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn submit_then_status_reports_waiting() {
        let d = dispatcher();
        let job_id = d.submit("email", "tenant-a", serde_json::json!({"to": "x@y"}), None).await.unwrap();
        let job = d.status("email", job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Waiting);
    }

    #[tokio::test]
    async fn pause_prevents_reservation() {
        let d = dispatcher();
        d.pause("email").await.unwrap();
        d.submit("email", "tenant-a", serde_json::json!({}), None).await.unwrap();
        assert!(d.broker.reserve("email", "w1", 1000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_removes_waiting_job() {
        let d = dispatcher();
        let job_id = d.submit("email", "tenant-a", serde_json::json!({}), None).await.unwrap();
        d.cancel("email", job_id).await.unwrap();
        assert!(d.status("email", job_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn submissions_past_the_queue_rate_limit_are_rejected() {
        let d = dispatcher();
        d.registry.declare(
            crate::models::Queue::builder()
                .name("limited".into())
                .rate_limit(Some(crate::models::queue::RateLimit { max: 1, window_ms: 60_000 }))
                .build(),
        );
        d.submit("limited", "tenant-a", serde_json::json!({}), None).await.unwrap();
        let result = d.submit("limited", "tenant-a", serde_json::json!({}), None).await;
        assert!(matches!(result, Err(DispatchError::RateLimited(_))));
    }
}
