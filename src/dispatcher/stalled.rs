//! Periodic sweep that returns active jobs whose lease has expired back
//! to waiting, incrementing `attemptNumber` and emitting `job.stalled`.
//! Runs at roughly half the visibility timeout, matching the contract
//! that stalled recovery makes at-least-once delivery total under worker
//! crashes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::models::subscription::LifecycleEvent;
use crate::models::JobStatus;

use super::JobDispatcher;

pub fn spawn_stalled_recovery(dispatcher: Arc<JobDispatcher>, queue_name: String, visibility_ms: u64) {
    let shutdown = dispatcher.shutdown_signal();
    let interval = Duration::from_millis((visibility_ms / 2).max(100));
    tokio::spawn(async move {
        loop {
            let shutdown_fut = shutdown.notified();
            tokio::pin!(shutdown_fut);
            tokio::select! {
                _ = &mut shutdown_fut => return,
                _ = tokio::time::sleep(interval) => {}
            }
            if let Err(e) = sweep_once(&dispatcher, &queue_name).await {
                warn!(error = %e, queue = %queue_name, "stalled-recovery sweep failed");
            }
        }
    });
}

async fn sweep_once(dispatcher: &Arc<JobDispatcher>, queue_name: &str) -> Result<(), crate::error::BrokerError> {
    let now = Utc::now();
    let expired = dispatcher.broker.expired_leases(queue_name, now).await?;
    for job_id in expired {
        let Some(mut job) = dispatcher.broker.find(queue_name, job_id).await? else { continue };
        if job.status != JobStatus::Active {
            continue;
        }
        job.attempt_number += 1;
        if job.attempt_number < job.options.attempts {
            job.status = JobStatus::Waiting;
            dispatcher.broker.retry(job.clone(), 0).await?;
            info!(job_id = %job_id, queue = %queue_name, "recovered stalled job");
            dispatcher.events.publish(crate::events::JobLifecycleEvent {
                event: LifecycleEvent::JobStalled,
                job_id: job.id,
                queue_name: job.queue_name.clone(),
                application_id: job.application_id.clone(),
                status: "waiting".into(),
                attempt_number: job.attempt_number,
                data: None,
                timestamp: now,
            });
        } else {
            job.status = JobStatus::Failed;
            job.failed_at = Some(now);
            job.error = Some(crate::models::job::JobError { message: "lease expired, attempts exhausted".into(), kind: "timeout".into() });
            dispatcher.broker.fail(job.clone()).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, InMemoryBroker};
    use crate::events::EventBus;
    use crate::registry::QueueRegistry;
    use crate::models::Job;

    #[tokio::test]
    async fn expired_lease_is_recovered_to_waiting() {
        let broker = Arc::new(InMemoryBroker::new());
        let dispatcher = Arc::new(JobDispatcher::new(broker.clone(), Arc::new(QueueRegistry::new()), Arc::new(EventBus::new())));
        let options = crate::models::JobOptions::builder().attempts(3).build();
        let job = Job::builder().queue_name("email".into()).data(serde_json::json!({})).options(options).application_id("tenant-a".into()).build();
        let job_id = job.id;
        broker.push(job).await.unwrap();
        broker.reserve("email", "w1", 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        sweep_once(&dispatcher, "email").await.unwrap();

        let recovered = broker.find("email", job_id).await.unwrap().unwrap();
        assert_eq!(recovered.status, JobStatus::Waiting);
        assert_eq!(recovered.attempt_number, 1);
    }
}
