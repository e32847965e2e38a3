//! C4 — scheduler: cron + one-shot triggers, next-fire computation,
//! execution log, enable/disable. A single leader per shard (elected
//! externally by a lease, out of scope here) runs the claim loop; this
//! module assumes it already holds the lease.

pub mod cron;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::models::schedule::{ExecutionStatus, HttpMethod, ScheduleTrigger};
use crate::models::Schedule;
use crate::persistence::{InMemoryStore, Store};

const TICK_INTERVAL: Duration = Duration::from_millis(500);
const MAX_CONCURRENT_EXECUTIONS: usize = 16;

pub struct Scheduler {
    store: InMemoryStore<Schedule>,
    by_name: DashMap<(String, String), Uuid>,
    http: Client,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { store: InMemoryStore::new(), by_name: DashMap::new(), http: Client::new() }
    }

    /// Computes `nextExecutionAt` for a newly-created or re-enabled
    /// schedule and persists it. `name` is unique per tenant; `by_name`
    /// is checked (not just maintained) so a second schedule under the
    /// same `(applicationId, name)` pair is rejected rather than silently
    /// shadowing the first.
    pub async fn create(&self, mut schedule: Schedule) -> Result<Schedule, SchedulerError> {
        let key = (schedule.application_id.clone(), schedule.name.clone());
        if self.by_name.contains_key(&key) {
            return Err(SchedulerError::NameConflict(schedule.application_id.clone(), schedule.name.clone()));
        }
        schedule.next_execution_at = Some(self.compute_first_fire(&schedule)?);
        self.by_name.insert(key, schedule.id);
        self.store.put(schedule.id, schedule.clone()).await;
        Ok(schedule)
    }

    pub async fn get(&self, id: Uuid) -> Result<Schedule, SchedulerError> {
        self.store.get(id).await.ok_or(SchedulerError::NotFound(id))
    }

    pub async fn list(&self) -> Vec<Schedule> {
        self.store.list().await
    }

    pub async fn update(&self, id: Uuid, mut patch: impl FnMut(&mut Schedule)) -> Result<Schedule, SchedulerError> {
        let mut schedule = self.get(id).await?;
        patch(&mut schedule);
        self.store.put(id, schedule.clone()).await;
        Ok(schedule)
    }

    /// `enabled = false` prevents further claims without touching
    /// `nextExecutionAt`; enabling recomputes it from now.
    pub async fn toggle(&self, id: Uuid, enabled: bool) -> Result<Schedule, SchedulerError> {
        let mut schedule = self.get(id).await?;
        schedule.enabled = enabled;
        if enabled {
            schedule.next_execution_at = Some(self.compute_first_fire(&schedule)?);
        }
        self.store.put(id, schedule.clone()).await;
        Ok(schedule)
    }

    /// Deletes the schedule; any in-flight broker registration (there is
    /// none here — the scheduler claims directly from its own store) is
    /// implicitly dropped.
    pub async fn delete(&self, id: Uuid) -> Result<(), SchedulerError> {
        let schedule = self.store.delete(id).await.ok_or(SchedulerError::NotFound(id))?;
        self.by_name.remove(&(schedule.application_id, schedule.name));
        Ok(())
    }

    /// Fires immediately without disturbing `nextExecutionAt`.
    pub async fn execute_now(&self, id: Uuid) -> Result<Schedule, SchedulerError> {
        let schedule = self.get(id).await?;
        let outcome = self.invoke_endpoint(&schedule).await;
        self.record_outcome(id, outcome).await
    }

    fn compute_first_fire(&self, schedule: &Schedule) -> Result<chrono::DateTime<Utc>, SchedulerError> {
        match &schedule.trigger {
            ScheduleTrigger::At { at } => Ok(*at),
            ScheduleTrigger::Cron { expression, timezone } => cron::next_fire_after(expression, timezone, Utc::now()),
        }
    }

    /// One tick of the leader loop: selects due, enabled schedules and
    /// executes each under bounded parallelism. Missed fires while the
    /// scheduler was down are coalesced to a single catch-up execution,
    /// since `next_fire_after` always recomputes from `now` rather than
    /// iterating every missed instant.
    #[instrument(skip(self))]
    pub async fn tick(&self) {
        let now = Utc::now();
        let due: Vec<Schedule> = self
            .store
            .list()
            .await
            .into_iter()
            .filter(|s| s.enabled && s.next_execution_at.map_or(false, |t| t <= now))
            .filter(|s| !s.is_past_end_date(now))
            .filter(|s| s.has_executions_remaining())
            .collect();

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_EXECUTIONS));
        let mut handles = Vec::new();
        for schedule in due {
            let semaphore = semaphore.clone();
            let http = self.http.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                let outcome = invoke_endpoint_with(&http, &schedule).await;
                (schedule, outcome)
            }));
        }
        for handle in handles {
            if let Ok((schedule, outcome)) = handle.await {
                let id = schedule.id;
                if let Some(recomputed) = self.claim_next_fire(&schedule) {
                    let _ = self.update(id, |s| {
                        s.execution_count += 1;
                        s.next_execution_at = recomputed;
                        if recomputed.is_none() && s.is_one_shot() {
                            s.enabled = false;
                        }
                    }).await;
                }
                let _ = self.record_outcome(id, outcome).await;
            }
        }
    }

    fn claim_next_fire(&self, schedule: &Schedule) -> Option<Option<chrono::DateTime<Utc>>> {
        match &schedule.trigger {
            ScheduleTrigger::At { .. } => Some(None),
            ScheduleTrigger::Cron { expression, timezone } => {
                let last = schedule.next_execution_at.unwrap_or_else(Utc::now);
                match cron::next_fire_after(expression, timezone, last) {
                    Ok(next) => Some(Some(next)),
                    Err(e) => {
                        warn!(schedule_id = %schedule.id, error = %e, "failed to recompute next fire");
                        None
                    }
                }
            }
        }
    }

    async fn invoke_endpoint(&self, schedule: &Schedule) -> Result<(), String> {
        invoke_endpoint_with(&self.http, schedule).await
    }

    async fn record_outcome(&self, id: Uuid, outcome: Result<(), String>) -> Result<Schedule, SchedulerError> {
        self.update(id, |s| {
            s.last_executed_at = Some(Utc::now());
            match &outcome {
                Ok(()) => {
                    s.last_execution_status = Some(ExecutionStatus::Success);
                    s.last_execution_error = None;
                }
                Err(message) => {
                    s.last_execution_status = Some(ExecutionStatus::Failed);
                    s.last_execution_error = Some(message.clone());
                }
            }
        }).await
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// POSTs/GETs the configured endpoint honouring `retryPolicy`.
async fn invoke_endpoint_with(http: &Client, schedule: &Schedule) -> Result<(), String> {
    let endpoint = &schedule.endpoint;
    let mut last_error = String::new();
    for attempt in 1..=schedule.retry_policy.attempts.max(1) {
        let mut builder = match endpoint.method {
            HttpMethod::Get => http.get(&endpoint.url),
            HttpMethod::Post => http.post(&endpoint.url),
        };
        for (k, v) in &endpoint.headers {
            builder = builder.header(k, v);
        }
        if let Some(body) = &endpoint.body {
            builder = builder.json(body);
        }
        builder = builder.timeout(Duration::from_millis(endpoint.timeout_ms));

        match builder.send().await {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => last_error = format!("endpoint returned {}", response.status()),
            Err(e) => last_error = e.to_string(),
        }
        if attempt < schedule.retry_policy.attempts {
            let delay = crate::common::time::jitter(schedule.retry_policy.base_delay_ms * attempt as u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
    Err(last_error)
}

pub fn tick_interval() -> Duration {
    TICK_INTERVAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schedule::EndpointAction;

    fn cron_schedule() -> Schedule {
        Schedule::builder()
            .name("ping".into())
            .application_id("tenant-a".into())
            .trigger(ScheduleTrigger::Cron { expression: "*/5 * * * *".into(), timezone: "UTC".into() })
            .endpoint(EndpointAction::builder().url("https://example.com/ping".into()).build())
            .created_by("system".into())
            .build()
    }

    #[tokio::test]
    async fn create_computes_next_execution_at() {
        let scheduler = Scheduler::new();
        let schedule = scheduler.create(cron_schedule()).await.unwrap();
        assert!(schedule.next_execution_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn disabling_keeps_next_execution_at_untouched() {
        let scheduler = Scheduler::new();
        let created = scheduler.create(cron_schedule()).await.unwrap();
        let before = created.next_execution_at;
        let disabled = scheduler.toggle(created.id, false).await.unwrap();
        assert_eq!(disabled.next_execution_at, before);
        assert!(!disabled.enabled);
    }

    #[tokio::test]
    async fn delete_removes_schedule() {
        let scheduler = Scheduler::new();
        let created = scheduler.create(cron_schedule()).await.unwrap();
        scheduler.delete(created.id).await.unwrap();
        assert!(scheduler.get(created.id).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_name_for_same_tenant_is_rejected() {
        let scheduler = Scheduler::new();
        scheduler.create(cron_schedule()).await.unwrap();
        let result = scheduler.create(cron_schedule()).await;
        assert!(matches!(result, Err(SchedulerError::NameConflict(_, _))));
    }

    #[tokio::test]
    async fn one_shot_schedule_disables_after_claim_next_fire() {
        let scheduler = Scheduler::new();
        let mut schedule = cron_schedule();
        schedule.trigger = ScheduleTrigger::At { at: Utc::now() };
        let created = scheduler.create(schedule).await.unwrap();
        assert_eq!(scheduler.claim_next_fire(&created), Some(None));
    }
}
