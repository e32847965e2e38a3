//! C1 — thin façade over the ordered-set broker: enqueue, reserve, ack,
//! fail, delay, pause. The broker is an external service boundary (an
//! in-memory ordered delayed-set + lists, not the document store); this
//! module defines the narrow interface the dispatcher drives and ships a
//! concrete in-process implementation used both in dev and in tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::BrokerError;
use crate::models::{Job, JobStatus};

pub use memory::InMemoryBroker;

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
    pub paused: bool,
}

/// Atomic, per-queue operations over the broker's waiting/delayed/active
/// sets. Priorities are integers, lower = earlier, ties broken by FIFO
/// enqueue order.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Appends the job to the waiting list, or the delayed set if
    /// `job.options.delay_until` is in the future. `job.status` is set by
    /// the caller before pushing (`Waiting` or `Delayed`).
    async fn push(&self, job: Job) -> Result<(), BrokerError>;

    /// Moves the highest-priority waiting job to the active set with a
    /// lease expiring at `now + visibility_ms`. Returns `None` if the
    /// queue is empty or paused.
    async fn reserve(&self, queue: &str, worker_id: &str, visibility_ms: u64) -> Result<Option<ReservedJob>, BrokerError>;

    /// Moves a leased job to the completed set. `job` must already carry
    /// `status = Completed`, `completed_at` and `result`.
    async fn complete(&self, job: Job) -> Result<(), BrokerError>;

    /// Moves a leased job back to the delayed set, due in
    /// `delay_ms`. `job` must already carry `status = Delayed` and the
    /// incremented `attempt_number`.
    async fn retry(&self, job: Job, delay_ms: u64) -> Result<(), BrokerError>;

    /// Moves a leased job to the failed set. `job` must already carry
    /// `status = Failed`, `failed_at` and `error`.
    async fn fail(&self, job: Job) -> Result<(), BrokerError>;

    /// Moves due delayed jobs back to waiting. Idempotent; safe to call
    /// from every worker on every tick.
    async fn scan_delayed(&self, queue: &str, now: DateTime<Utc>) -> Result<u64, BrokerError>;

    async fn pause(&self, queue: &str) -> Result<(), BrokerError>;
    async fn resume(&self, queue: &str) -> Result<(), BrokerError>;
    async fn is_paused(&self, queue: &str) -> Result<bool, BrokerError>;

    async fn list_by_state(&self, queue: &str, state: JobStatus, offset: usize, limit: usize) -> Result<Vec<Job>, BrokerError>;
    async fn counts(&self, queue: &str) -> Result<QueueCounts, BrokerError>;

    /// Leases whose holder has not extended them past `now` — used by the
    /// stalled-recovery sweep.
    async fn expired_leases(&self, queue: &str, now: DateTime<Utc>) -> Result<Vec<Uuid>, BrokerError>;

    async fn extend_lease(&self, queue: &str, job_id: Uuid, visibility_ms: u64) -> Result<(), BrokerError>;

    async fn remove(&self, queue: &str, job_id: Uuid) -> Result<(), BrokerError>;

    /// Finds a job by id regardless of which set it currently sits in.
    async fn find(&self, queue: &str, job_id: Uuid) -> Result<Option<Job>, BrokerError>;
}

#[derive(Debug, Clone)]
pub struct ReservedJob {
    pub job: Job,
    pub lease_expires_at: DateTime<Utc>,
}
