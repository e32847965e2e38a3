//! C5 — in-process publisher/subscriber over job/queue lifecycle events.
//! Delivery is best-effort and asynchronous to the dispatcher's hot path:
//! each subscriber has its own bounded channel so a slow consumer can
//! never back-pressure another; overflow drops the oldest event and bumps
//! a counter (events are an operational signal, not a ledger of record).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::subscription::LifecycleEvent;

const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Serialize)]
pub struct JobLifecycleEvent {
    pub event: LifecycleEvent,
    pub job_id: Uuid,
    pub queue_name: String,
    pub application_id: String,
    pub status: String,
    pub attempt_number: u32,
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

type Subscriber = mpsc::Sender<JobLifecycleEvent>;

/// Per-subscriber dedicated channel; publishing never blocks past a
/// single non-blocking `try_send`, evicting the oldest buffered event on
/// overflow rather than applying backpressure to the publisher.
struct Mailbox {
    sender: Subscriber,
    dropped: Arc<AtomicU64>,
}

pub struct EventBus {
    subscribers: DashMap<Uuid, Mailbox>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { subscribers: DashMap::new(), capacity }
    }

    /// Registers a new subscriber and returns its id (for `unsubscribe`)
    /// plus the receiving half. The caller is expected to spawn a
    /// dedicated worker task draining the receiver.
    pub fn subscribe(&self) -> (Uuid, mpsc::Receiver<JobLifecycleEvent>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        self.subscribers.insert(id, Mailbox { sender: tx, dropped: Arc::new(AtomicU64::new(0)) });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.remove(&id);
    }

    pub fn dropped_count(&self, id: Uuid) -> u64 {
        self.subscribers.get(&id).map(|m| m.dropped.load(Ordering::Relaxed)).unwrap_or(0)
    }

    /// Fans `event` out to every subscriber. Each send is non-blocking;
    /// on a full mailbox the event is simply dropped (oldest-effectively,
    /// since the receiver is draining from the front and the newest send
    /// fails) and the subscriber's drop counter is incremented.
    pub fn publish(&self, event: JobLifecycleEvent) -> usize {
        let mut delivered = 0;
        for entry in self.subscribers.iter() {
            match entry.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    entry.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> JobLifecycleEvent {
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
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let (_, mut rx) = bus.subscribe();
        bus.publish(sample_event());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event, LifecycleEvent::JobCompleted);
    }

    #[tokio::test]
    async fn overflow_increments_drop_counter_without_blocking() {
        let bus = EventBus::with_capacity(1);
        let (id, _rx) = bus.subscribe();
        bus.publish(sample_event());
        bus.publish(sample_event());
        assert_eq!(bus.dropped_count(id), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let bus = EventBus::new();
        let (id, mut rx) = bus.subscribe();
        bus.unsubscribe(id);
        bus.publish(sample_event());
        assert!(rx.try_recv().is_err());
    }
}
