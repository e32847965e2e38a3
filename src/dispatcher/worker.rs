//! Per-queue worker pool: the execution loop from the dispatcher design —
//! reserve, run the processor under a cancellation token bound to
//! `timeoutMs`, and apply retry/removal policy on completion.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::models::subscription::LifecycleEvent;
use crate::models::{Job, JobError, JobStatus};

use super::{next_retry_delay_ms, JobDispatcher};

/// Spawns `pool_size` workers for `queue_name`, each running
/// [`run_worker_loop`] until the dispatcher's shutdown signal fires.
pub fn spawn_worker_pool(dispatcher: Arc<JobDispatcher>, queue_name: String, pool_size: usize) {
    for idx in 0..pool_size {
        let dispatcher = dispatcher.clone();
        let queue_name = queue_name.clone();
        let worker_id = format!("{queue_name}-worker-{idx}");
        let shutdown = dispatcher.shutdown_signal();
        let handle = tokio::spawn(async move {
            run_worker_loop(dispatcher, queue_name, worker_id, shutdown).await;
        });
        dispatcher.track_worker(&queue_name, handle);
    }
}

async fn run_worker_loop(dispatcher: Arc<JobDispatcher>, queue_name: String, worker_id: String, shutdown: Arc<tokio::sync::Notify>) {
    loop {
        let shutdown_fut = shutdown.notified();
        tokio::pin!(shutdown_fut);
        tokio::select! {
            _ = &mut shutdown_fut => return,
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }

        if dispatcher.broker.is_paused(&queue_name).await.unwrap_or(false) {
            continue;
        }

        let _ = dispatcher.broker.scan_delayed(&queue_name, Utc::now()).await;

        let Some(handler) = dispatcher.handler_for(&queue_name) else {
            continue;
        };

        let default_timeout = dispatcher.default_timeout_ms();
        let probe_visibility_ms = default_timeout.max(1) * 2;
        let reserved = match dispatcher.broker.reserve(&queue_name, &worker_id, probe_visibility_ms).await {
            Ok(Some(r)) => r,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, queue = %queue_name, "broker reservation failed, backing off");
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }
        };

        // The lease was opened against the default timeout before the
        // job's own `timeoutMs` was known; correct it now so a job with a
        // longer timeout doesn't get reclaimed by stalled recovery while
        // still legitimately running.
        let visibility_ms = reserved.job.options.timeout_ms.max(default_timeout).saturating_mul(2);
        if let Err(e) = dispatcher.broker.extend_lease(&queue_name, reserved.job.id, visibility_ms).await {
            warn!(error = %e, queue = %queue_name, job_id = %reserved.job.id, "failed to extend lease to job timeout");
        }

        process_one(&dispatcher, &queue_name, reserved.job, handler).await;
    }
}

#[instrument(skip(dispatcher, handler), fields(job_id = %job.id, queue_name = %queue_name))]
async fn process_one(dispatcher: &Arc<JobDispatcher>, queue_name: &str, mut job: Job, handler: Arc<dyn super::JobHandler>) {
    job.status = JobStatus::Active;
    job.started_at = Some(Utc::now());
    job.attempt_number += 1;
    publish(dispatcher, &job, LifecycleEvent::JobStarted);

    let timeout_ms = job.options.timeout_ms;
    let token = CancellationToken::new();
    dispatcher.active_cancellations.insert(job.id, token.clone());

    let outcome = tokio::select! {
        result = handler.handle(&job, token.clone()) => Outcome::Finished(result),
        _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => Outcome::TimedOut,
        _ = token.cancelled() => Outcome::Cancelled,
    };
    dispatcher.active_cancellations.remove(&job.id);

    match outcome {
        Outcome::Finished(Ok(result)) => {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
            job.result = Some(result);
            if let Err(e) = dispatcher.broker.complete(job.clone()).await {
                error!(error = %e, "failed to mark job completed");
            }
            publish(dispatcher, &job, LifecycleEvent::JobCompleted);
            apply_removal_policy(dispatcher, &job, JobStatus::Completed).await;
        }
        Outcome::Finished(Err(message)) => fail_or_retry(dispatcher, job, JobError { message, kind: "processor".into() }).await,
        Outcome::TimedOut => {
            fail_or_retry(dispatcher, job, JobError { message: format!("timed out after {timeout_ms}ms"), kind: "timeout".into() }).await
        }
        Outcome::Cancelled => {
            info!("job cancelled mid-flight");
        }
    }
}

enum Outcome {
    Finished(Result<serde_json::Value, String>),
    TimedOut,
    Cancelled,
}

async fn fail_or_retry(dispatcher: &Arc<JobDispatcher>, mut job: Job, error: JobError) {
    if job.attempt_number < job.options.attempts {
        let delay_ms = next_retry_delay_ms(&job.options, job.attempt_number);
        job.status = JobStatus::Delayed;
        job.error = Some(error);
        if let Err(e) = dispatcher.broker.retry(job.clone(), delay_ms).await {
            error!(error = %e, "failed to requeue job for retry");
        }
        publish(dispatcher, &job, LifecycleEvent::JobRetrying);
    } else {
        job.status = JobStatus::Failed;
        job.failed_at = Some(Utc::now());
        job.error = Some(error);
        if let Err(e) = dispatcher.broker.fail(job.clone()).await {
            error!(error = %e, "failed to mark job failed");
        }
        publish(dispatcher, &job, LifecycleEvent::JobFailed);
        apply_removal_policy(dispatcher, &job, JobStatus::Failed).await;
    }
}

async fn apply_removal_policy(dispatcher: &Arc<JobDispatcher>, job: &Job, status: JobStatus) {
    let policy = match status {
        JobStatus::Completed => job.options.remove_on_complete,
        JobStatus::Failed => job.options.remove_on_fail,
        _ => None,
    };
    let Some(policy) = policy else { return };
    let Some(max_count) = policy.max_count else { return };
    let jobs = match dispatcher.broker.list_by_state(&job.queue_name, status, 0, usize::MAX).await {
        Ok(jobs) => jobs,
        Err(_) => return,
    };
    if jobs.len() as u64 <= max_count {
        return;
    }
    // Oldest-first eviction, newest `max_count` retained.
    let mut sorted = jobs;
    let key = |j: &Job| match status {
        JobStatus::Completed => j.completed_at,
        JobStatus::Failed => j.failed_at,
        _ => None,
    };
    sorted.sort_by_key(|j| key(j).unwrap_or(j.created_at));
    let excess = sorted.len() - max_count as usize;
    for stale in &sorted[..excess] {
        let _ = dispatcher.broker.remove(&job.queue_name, stale.id).await;
    }
}

fn publish(dispatcher: &Arc<JobDispatcher>, job: &Job, event: LifecycleEvent) {
    dispatcher.events.publish(crate::events::JobLifecycleEvent {
        event,
        job_id: job.id,
        queue_name: job.queue_name.clone(),
        application_id: job.application_id.clone(),
        status: format!("{:?}", job.status).to_lowercase(),
        attempt_number: job.attempt_number,
        data: job.result.clone(),
        timestamp: Utc::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::dispatcher::JobHandler;
    use crate::events::EventBus;
    use crate::registry::QueueRegistry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysSucceeds;
    #[async_trait]
    impl JobHandler for AlwaysSucceeds {
        async fn handle(&self, _job: &Job, _cancel: CancellationToken) -> Result<serde_json::Value, String> {
            Ok(serde_json::json!({"sent": true}))
        }
    }

    struct FailsNTimes {
        remaining: AtomicU32,
    }
    #[async_trait]
    impl JobHandler for FailsNTimes {
        async fn handle(&self, _job: &Job, _cancel: CancellationToken) -> Result<serde_json::Value, String> {
            if self.remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err("SMTP_TIMEOUT".to_string())
            } else {
                Ok(serde_json::json!({"sent": true}))
            }
        }
    }

    fn dispatcher() -> Arc<JobDispatcher> {
        Arc::new(JobDispatcher::new(Arc::new(InMemoryBroker::new()), Arc::new(QueueRegistry::new()), Arc::new(EventBus::new())))
    }

    #[tokio::test]
    async fn submit_succeed_completes_on_first_attempt() {
        let d = dispatcher();
        d.register_handler("email", Arc::new(AlwaysSucceeds));
        let job_id = d.submit("email", "tenant-a", serde_json::json!({"to": "x@y"}), None).await.unwrap();

        let handler = d.handler_for("email").unwrap();
        let job = d.broker.reserve("email", "w1", 60_000).await.unwrap().unwrap().job;
        process_one(&d, "email", job, handler).await;

        let job = d.status("email", job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempt_number, 1);
        assert_eq!(job.result, Some(serde_json::json!({"sent": true})));
    }

    #[tokio::test]
    async fn retry_then_succeed_reaches_completed_on_third_attempt() {
        let d = dispatcher();
        let options = crate::models::JobOptions::builder().attempts(3).build();
        d.register_handler("email", Arc::new(FailsNTimes { remaining: AtomicU32::new(2) }));
        let job_id = d.submit("email", "tenant-a", serde_json::json!({}), Some(options)).await.unwrap();

        for _ in 0..3 {
            let _ = d.broker.scan_delayed("email", Utc::now() + chrono::Duration::seconds(60)).await;
            if let Some(reserved) = d.broker.reserve("email", "w1", 60_000).await.unwrap() {
                let handler = d.handler_for("email").unwrap();
                process_one(&d, "email", reserved.job, handler).await;
            }
        }

        let job = d.status("email", job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempt_number, 3);
    }
}
