use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::BrokerError;
use crate::models::{Job, JobStatus};

use super::{Broker, QueueCounts, ReservedJob};

#[derive(Debug, Clone)]
struct WaitingEntry {
    priority: i32,
    enqueued_at: DateTime<Utc>,
    job: Job,
}

impl PartialEq for WaitingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.enqueued_at == other.enqueued_at
    }
}
impl Eq for WaitingEntry {}

impl Ord for WaitingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want lowest priority number and
        // earliest enqueue time to sort first, so reverse both.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
    }
}
impl PartialOrd for WaitingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Lease {
    job: Job,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    waiting: BinaryHeap<WaitingEntry>,
    delayed: Vec<(DateTime<Utc>, Job)>,
    active: HashMap<Uuid, Lease>,
    completed: VecDeque<Job>,
    failed: VecDeque<Job>,
    paused: bool,
}

/// In-memory broker: an ordered delayed-set plus waiting/active/terminal
/// lists, implemented in-process rather than against an external service.
/// Used as the default backend for local development and is the seam for
/// deterministic dispatcher/stalled-recovery tests.
#[derive(Default)]
pub struct InMemoryBroker {
    queues: DashMap<String, Mutex<QueueState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> dashmap::mapref::one::Ref<'_, String, Mutex<QueueState>> {
        if !self.queues.contains_key(name) {
            self.queues.entry(name.to_string()).or_insert_with(|| Mutex::new(QueueState::default()));
        }
        self.queues.get(name).expect("just inserted")
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn push(&self, mut job: Job) -> Result<(), BrokerError> {
        let guard = self.queue(&job.queue_name.clone());
        let mut state = guard.lock().unwrap();
        if let Some(delay_until) = job.options.delay_until {
            if delay_until > Utc::now() {
                job.status = JobStatus::Delayed;
                state.delayed.push((delay_until, job));
                return Ok(());
            }
        }
        job.status = JobStatus::Waiting;
        let priority = job.options.priority;
        let enqueued_at = job.created_at;
        state.waiting.push(WaitingEntry { priority, enqueued_at, job });
        Ok(())
    }

    async fn reserve(&self, queue: &str, _worker_id: &str, visibility_ms: u64) -> Result<Option<ReservedJob>, BrokerError> {
        let guard = self.queue(queue);
        let mut state = guard.lock().unwrap();
        if state.paused {
            return Ok(None);
        }
        let Some(entry) = state.waiting.pop() else {
            return Ok(None);
        };
        let mut job = entry.job;
        job.status = JobStatus::Active;
        job.started_at = Some(Utc::now());
        let expires_at = Utc::now() + chrono::Duration::milliseconds(visibility_ms as i64);
        let reserved = ReservedJob { job: job.clone(), lease_expires_at: expires_at };
        state.active.insert(job.id, Lease { job, expires_at });
        Ok(Some(reserved))
    }

    async fn complete(&self, job: Job) -> Result<(), BrokerError> {
        let guard = self.queue(&job.queue_name.clone());
        let mut state = guard.lock().unwrap();
        state.active.remove(&job.id).ok_or(BrokerError::JobNotFound(job.id))?;
        state.completed.push_back(job);
        Ok(())
    }

    async fn retry(&self, job: Job, delay_ms: u64) -> Result<(), BrokerError> {
        let guard = self.queue(&job.queue_name.clone());
        let mut state = guard.lock().unwrap();
        state.active.remove(&job.id).ok_or(BrokerError::JobNotFound(job.id))?;
        if delay_ms == 0 {
            let priority = job.options.priority;
            let mut job = job;
            job.status = JobStatus::Waiting;
            state.waiting.push(WaitingEntry { priority, enqueued_at: Utc::now(), job });
        } else {
            let due = Utc::now() + chrono::Duration::milliseconds(delay_ms as i64);
            state.delayed.push((due, job));
        }
        Ok(())
    }

    async fn fail(&self, job: Job) -> Result<(), BrokerError> {
        let guard = self.queue(&job.queue_name.clone());
        let mut state = guard.lock().unwrap();
        state.active.remove(&job.id).ok_or(BrokerError::JobNotFound(job.id))?;
        state.failed.push_back(job);
        Ok(())
    }

    async fn scan_delayed(&self, queue: &str, now: DateTime<Utc>) -> Result<u64, BrokerError> {
        let guard = self.queue(queue);
        let mut state = guard.lock().unwrap();
        let (due, not_due): (Vec<_>, Vec<_>) = state.delayed.drain(..).partition(|(t, _)| *t <= now);
        let moved = due.len() as u64;
        for (_, mut job) in due {
            job.status = JobStatus::Waiting;
            let priority = job.options.priority;
            state.waiting.push(WaitingEntry { priority, enqueued_at: job.created_at, job });
        }
        state.delayed = not_due;
        Ok(moved)
    }

    async fn pause(&self, queue: &str) -> Result<(), BrokerError> {
        self.queue(queue).lock().unwrap().paused = true;
        Ok(())
    }

    async fn resume(&self, queue: &str) -> Result<(), BrokerError> {
        self.queue(queue).lock().unwrap().paused = false;
        Ok(())
    }

    async fn is_paused(&self, queue: &str) -> Result<bool, BrokerError> {
        Ok(self.queue(queue).lock().unwrap().paused)
    }

    async fn list_by_state(&self, queue: &str, state_kind: JobStatus, offset: usize, limit: usize) -> Result<Vec<Job>, BrokerError> {
        let guard = self.queue(queue);
        let state = guard.lock().unwrap();
        let jobs: Vec<Job> = match state_kind {
            JobStatus::Waiting => state.waiting.iter().map(|e| e.job.clone()).collect(),
            JobStatus::Delayed => state.delayed.iter().map(|(_, j)| j.clone()).collect(),
            JobStatus::Active => state.active.values().map(|l| l.job.clone()).collect(),
            JobStatus::Completed => state.completed.iter().cloned().collect(),
            JobStatus::Failed => state.failed.iter().cloned().collect(),
            JobStatus::Paused => Vec::new(),
        };
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    async fn counts(&self, queue: &str) -> Result<QueueCounts, BrokerError> {
        let guard = self.queue(queue);
        let state = guard.lock().unwrap();
        Ok(QueueCounts {
            waiting: state.waiting.len() as u64,
            active: state.active.len() as u64,
            delayed: state.delayed.len() as u64,
            completed: state.completed.len() as u64,
            failed: state.failed.len() as u64,
            paused: state.paused,
        })
    }

    async fn expired_leases(&self, queue: &str, now: DateTime<Utc>) -> Result<Vec<Uuid>, BrokerError> {
        let guard = self.queue(queue);
        let state = guard.lock().unwrap();
        Ok(state.active.iter().filter(|(_, l)| l.expires_at <= now).map(|(id, _)| *id).collect())
    }

    async fn extend_lease(&self, queue: &str, job_id: Uuid, visibility_ms: u64) -> Result<(), BrokerError> {
        let guard = self.queue(queue);
        let mut state = guard.lock().unwrap();
        let lease = state.active.get_mut(&job_id).ok_or(BrokerError::JobNotFound(job_id))?;
        lease.expires_at = Utc::now() + chrono::Duration::milliseconds(visibility_ms as i64);
        Ok(())
    }

    async fn remove(&self, queue: &str, job_id: Uuid) -> Result<(), BrokerError> {
        let guard = self.queue(queue);
        let mut state = guard.lock().unwrap();
        state.active.remove(&job_id);
        state.waiting.retain(|e| e.job.id != job_id);
        state.delayed.retain(|(_, j)| j.id != job_id);
        Ok(())
    }

    async fn find(&self, queue: &str, job_id: Uuid) -> Result<Option<Job>, BrokerError> {
        let guard = self.queue(queue);
        let state = guard.lock().unwrap();
        if let Some(lease) = state.active.get(&job_id) {
            return Ok(Some(lease.job.clone()));
        }
        if let Some(entry) = state.waiting.iter().find(|e| e.job.id == job_id) {
            return Ok(Some(entry.job.clone()));
        }
        if let Some((_, job)) = state.delayed.iter().find(|(_, j)| j.id == job_id) {
            return Ok(Some(job.clone()));
        }
        if let Some(job) = state.completed.iter().find(|j| j.id == job_id) {
            return Ok(Some(job.clone()));
        }
        if let Some(job) = state.failed.iter().find(|j| j.id == job_id) {
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobOptions;

    fn job(queue: &str, options: JobOptions) -> Job {
        Job::builder()
            .queue_name(queue.to_string())
            .data(serde_json::json!({}))
            .options(options)
            .application_id("tenant-a".to_string())
            .build()
    }

    #[tokio::test]
    async fn push_then_reserve_returns_highest_priority_first() {
        let broker = InMemoryBroker::new();
        let low = job("email", JobOptions::builder().priority(10).build());
        let high = job("email", JobOptions::builder().priority(1).build());
        let high_id = high.id;
        broker.push(low).await.unwrap();
        broker.push(high).await.unwrap();

        let reserved = broker.reserve("email", "w1", 30_000).await.unwrap().unwrap();
        assert_eq!(reserved.job.id, high_id);
    }

    #[tokio::test]
    async fn paused_queue_yields_no_reservations() {
        let broker = InMemoryBroker::new();
        broker.pause("email").await.unwrap();
        broker.push(job("email", JobOptions::default())).await.unwrap();
        assert!(broker.reserve("email", "w1", 1000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_moves_job_to_completed() {
        let broker = InMemoryBroker::new();
        let j = job("email", JobOptions::default());
        broker.push(j).await.unwrap();
        let reserved = broker.reserve("email", "w1", 1000).await.unwrap().unwrap();
        let mut completed_job = reserved.job;
        completed_job.status = JobStatus::Completed;
        completed_job.completed_at = Some(Utc::now());
        broker.complete(completed_job).await.unwrap();
        let counts = broker.counts("email").await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.active, 0);
    }

    #[tokio::test]
    async fn expired_lease_is_detected() {
        let broker = InMemoryBroker::new();
        let j = job("email", JobOptions::default());
        let job_id = j.id;
        broker.push(j).await.unwrap();
        broker.reserve("email", "w1", 0).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let expired = broker.expired_leases("email", Utc::now()).await.unwrap();
        assert_eq!(expired, vec![job_id]);
    }

    #[tokio::test]
    async fn scan_delayed_moves_due_jobs_to_waiting() {
        let broker = InMemoryBroker::new();
        let opts = JobOptions::builder().delay_until(Some(Utc::now() - chrono::Duration::seconds(1))).build();
        broker.push(job("email", opts)).await.unwrap();
        let moved = broker.scan_delayed("email", Utc::now()).await.unwrap();
        assert_eq!(moved, 1);
        let counts = broker.counts("email").await.unwrap();
        assert_eq!(counts.waiting, 1);
        assert_eq!(counts.delayed, 0);
    }
}
