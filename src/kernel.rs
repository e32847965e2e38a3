//! Composition root: owns every component and wires the cross-component
//! plumbing (C5 event bus -> C6 webhook engine) that would otherwise be
//! duplicated at every call site. Nothing outside this module should
//! construct a component directly except tests.

use std::sync::Arc;

use dashmap::DashMap;
use sqlx::PgPool;

use crate::broker::{Broker, InMemoryBroker};
use crate::config::Config;
use crate::dispatcher::JobDispatcher;
use crate::events::EventBus;
use crate::reasoning::ReasoningStore;
use crate::registry::{self, QueueRegistry};
use crate::scheduler::Scheduler;
use crate::sessions::SessionStore;
use crate::vector::{BaseEmbeddingService, InMemoryVectorIndex, OpenAiEmbeddingService, VectorIndex};
use crate::webhooks::WebhookEngine;

pub struct Kernel {
    pub registry: Arc<QueueRegistry>,
    pub dispatcher: Arc<JobDispatcher>,
    pub scheduler: Arc<Scheduler>,
    pub events: Arc<EventBus>,
    pub webhooks: Arc<WebhookEngine>,
    pub vectors: Arc<dyn VectorIndex>,
    pub embeddings: Option<Arc<dyn BaseEmbeddingService>>,
    pub reasoning: Arc<ReasoningStore>,
    pub sessions: Arc<SessionStore>,
    /// Queues a worker pool and stalled-recovery sweep have already been
    /// spawned for. Guards `ensure_queue_running` so a queue seen for the
    /// first time outside the declared set (C2's lazy ad-hoc creation)
    /// still gets workers, exactly once.
    running_queues: DashMap<String, ()>,
}

impl Kernel {
    /// `db_pool` selects the vector index backend: `Some` wires the
    /// Postgres + pgvector store, `None` falls back to the in-memory one
    /// (used by tests and by `BROKER_ADDR=memory://local` deployments).
    pub fn new(config: &Config, db_pool: Option<PgPool>) -> Self {
        let registry = Arc::new(registry::with_default_queues());
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
        let events = Arc::new(EventBus::new());
        let dispatcher = Arc::new(JobDispatcher::new(broker, registry.clone(), events.clone()));
        let scheduler = Arc::new(Scheduler::new());
        let webhooks = Arc::new(WebhookEngine::new());
        let sessions = Arc::new(SessionStore::new());
        let reasoning = Arc::new(ReasoningStore::new(sessions.clone()));

        let vectors: Arc<dyn VectorIndex> = match db_pool {
            Some(pool) => Arc::new(crate::vector::postgres::PostgresVectorIndex::new(pool)),
            None => Arc::new(InMemoryVectorIndex::new()),
        };

        let embeddings: Option<Arc<dyn BaseEmbeddingService>> = config.embedding_provider_key.clone().map(|key| {
            Arc::new(OpenAiEmbeddingService::new(key, config.embedding_model.clone(), config.embedding_dimensions)) as Arc<dyn BaseEmbeddingService>
        });

        crate::webhooks::spawn_webhook_worker(webhooks.clone(), events.clone());

        Self {
            registry,
            dispatcher,
            scheduler,
            events,
            webhooks,
            vectors,
            embeddings,
            reasoning,
            sessions,
            running_queues: DashMap::new(),
        }
    }

    /// Starts the background loops (worker pools for the declared queues,
    /// scheduler tick loop) that keep the dispatcher and scheduler making
    /// forward progress. Queues created later, ad hoc, are started on
    /// first submission by `submit_job` instead.
    pub fn spawn_background_tasks(&self) {
        for queue in self.registry.list() {
            self.ensure_queue_running(&queue.name);
        }

        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(crate::scheduler::tick_interval());
            loop {
                interval.tick().await;
                scheduler.tick().await;
            }
        });
    }

    /// Spawns a worker pool and stalled-recovery sweep for `queue_name`
    /// the first time it's seen. Safe to call repeatedly and concurrently
    /// for the same name: `DashMap::entry` holds the shard lock across
    /// the check-and-spawn, so only the first caller actually spawns.
    pub fn ensure_queue_running(&self, queue_name: &str) {
        self.running_queues.entry(queue_name.to_string()).or_insert_with(|| {
            crate::dispatcher::worker::spawn_worker_pool(self.dispatcher.clone(), queue_name.to_string(), 4);
            crate::dispatcher::stalled::spawn_stalled_recovery(self.dispatcher.clone(), queue_name.to_string(), self.dispatcher.default_timeout_ms() * 2);
        });
    }

    /// Ensures the target queue has workers running, then submits through
    /// the dispatcher. Declared queues are already running by the time
    /// `spawn_background_tasks` returns; this only does real work the
    /// first time a client submits to an ad-hoc queue name.
    pub async fn submit_job(
        &self,
        queue_name: &str,
        application_id: &str,
        data: serde_json::Value,
        options: Option<crate::models::JobOptions>,
    ) -> Result<uuid::Uuid, crate::error::DispatchError> {
        // Validate/create the queue before spawning workers for it, so a
        // malformed queue name never gets a worker pool of its own.
        if self.registry.get_or_create(queue_name).is_some() {
            self.ensure_queue_running(queue_name);
        }
        self.dispatcher.submit(queue_name, application_id, data, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        std::env::set_var("DB_URI", "postgres://x/y");
        Config::from_env().unwrap()
    }

    #[tokio::test]
    async fn kernel_wires_webhook_engine_to_event_bus() {
        let kernel = Kernel::new(&test_config(), None);
        let subscription = crate::models::Subscription::builder()
            .application_id("tenant-a".into())
            .url("https://example.invalid/hook".into())
            .events(vec![crate::models::subscription::LifecycleEvent::JobCompleted])
            .secret("s".into())
            .retry_config(crate::models::subscription::RetryConfig::builder().max_attempts(1).build())
            .build();
        kernel.webhooks.create_subscription(subscription).await;

        kernel.events.publish(crate::events::JobLifecycleEvent {
            event: crate::models::subscription::LifecycleEvent::JobCompleted,
            job_id: uuid::Uuid::new_v4(),
            queue_name: "email".into(),
            application_id: "tenant-a".into(),
            status: "completed".into(),
            attempt_number: 1,
            data: None,
            timestamp: chrono::Utc::now(),
        });

        // Give the spawned webhook worker a chance to drain the event;
        // the delivery itself will fail against the invalid host, but the
        // subscription's failure bookkeeping proves the wiring ran.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let updated = kernel.webhooks.list_subscriptions().await;
        assert_eq!(updated[0].failure_count, 1);
    }
}
