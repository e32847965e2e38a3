//! C6 — webhook engine: subscription matching, HMAC signing, retried
//! delivery, failure tracking. Consumes lifecycle events published by C5
//! and fans them out to matching subscriptions on a dedicated worker pool
//! so a slow/unreachable endpoint never stalls event consumption.

pub mod delivery;
pub mod signing;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::WebhookError;
use crate::events::{EventBus, JobLifecycleEvent};
use crate::models::Subscription;
use crate::persistence::{InMemoryStore, Store};

pub struct WebhookEngine {
    subscriptions: InMemoryStore<Subscription>,
    http: Client,
}

impl WebhookEngine {
    pub fn new() -> Self {
        Self { subscriptions: InMemoryStore::new(), http: Client::new() }
    }

    pub async fn create_subscription(&self, subscription: Subscription) -> Subscription {
        self.subscriptions.put(subscription.id, subscription.clone()).await;
        subscription
    }

    pub async fn get_subscription(&self, id: Uuid) -> Result<Subscription, WebhookError> {
        self.subscriptions.get(id).await.ok_or(WebhookError::NotFound(id))
    }

    pub async fn delete_subscription(&self, id: Uuid) -> Result<(), WebhookError> {
        self.subscriptions.delete(id).await.ok_or(WebhookError::NotFound(id))?;
        Ok(())
    }

    pub async fn list_subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.list().await
    }

    /// Matches `event` against every active subscription and delivers in
    /// parallel. Each delivery updates the subscription's bookkeeping
    /// (`lastTriggeredAt`, `failureCount`, `recentFailures`) and
    /// auto-deactivates once the 10-failures/24h threshold is crossed.
    #[instrument(skip(self, incoming))]
    pub async fn handle_event(&self, incoming: &JobLifecycleEvent) {
        let metadata = HashMap::new();
        let candidates: Vec<Subscription> = self
            .subscriptions
            .list()
            .await
            .into_iter()
            .filter(|s| s.application_id == incoming.application_id)
            .filter(|s| s.matches(incoming.event, &incoming.queue_name, &incoming.status, &metadata))
            .collect();

        for subscription in candidates {
            self.deliver_and_record(subscription, incoming).await;
        }
    }

    async fn deliver_and_record(&self, subscription: Subscription, incoming: &JobLifecycleEvent) {
        let data = incoming.data.clone().unwrap_or(serde_json::json!({ "jobId": incoming.job_id, "queueName": incoming.queue_name }));
        let outcome = delivery::deliver_with_retry(&self.http, &subscription, incoming.event, incoming.job_id, &data).await;

        let now = Utc::now();
        let mut updated = subscription.clone();
        updated.last_triggered_at = Some(now);
        if outcome.succeeded {
            info!(subscription_id = %subscription.id, event = incoming.event.name(), "webhook delivered");
        } else {
            updated.failure_count += 1;
            updated.recent_failures.push(now);
            updated.recent_failures.retain(|t| *t >= now - chrono::Duration::hours(24));
            if updated.should_deactivate(now) {
                updated.active = false;
                warn!(subscription_id = %subscription.id, "subscription auto-deactivated after repeated failures");
            }
        }
        self.subscriptions.put(updated.id, updated).await;
    }
}

impl Default for WebhookEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the dedicated worker draining the event bus subscription and
/// forwarding each event into the webhook engine.
pub fn spawn_webhook_worker(engine: Arc<WebhookEngine>, bus: Arc<EventBus>) {
    let (_, mut rx) = bus.subscribe();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            engine.handle_event(&event).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::subscription::LifecycleEvent;

    fn incoming() -> JobLifecycleEvent {
        JobLifecycleEvent {
            event: LifecycleEvent::JobCompleted,
            job_id: Uuid::new_v4(),
            queue_name: "email".into(),
            application_id: "tenant-a".into(),
            status: "completed".into(),
            attempt_number: 1,
            data: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn inactive_subscription_does_not_match() {
        let engine = WebhookEngine::new();
        let mut sub = Subscription::builder()
            .application_id("tenant-a".into())
            .url("https://example.invalid/hook".into())
            .events(vec![LifecycleEvent::JobCompleted])
            .secret("s".into())
            .build();
        sub.active = false;
        engine.create_subscription(sub).await;
        // handle_event should simply skip it without delivering.
        engine.handle_event(&incoming()).await;
    }

    #[tokio::test]
    async fn repeated_failures_deactivate_subscription() {
        let mut sub = Subscription::builder()
            .application_id("tenant-a".into())
            .url("https://example.invalid/hook".into())
            .events(vec![LifecycleEvent::JobCompleted])
            .secret("s".into())
            .build();
        sub.recent_failures = (0..9).map(|_| Utc::now()).collect();
        sub.failure_count = 9;
        assert!(!sub.should_deactivate(Utc::now()));
        sub.recent_failures.push(Utc::now());
        assert!(sub.should_deactivate(Utc::now()));
    }
}
