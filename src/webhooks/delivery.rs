use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

use crate::models::subscription::HttpMethod;
use crate::models::{LifecycleEvent, Subscription};

use super::signing::sign;

#[derive(Debug, Serialize)]
struct WebhookEnvelope<'a> {
    event: &'a str,
    timestamp: i64,
    data: &'a serde_json::Value,
}

pub struct DeliveryOutcome {
    pub succeeded: bool,
    pub attempts: u32,
}

/// Delivers one event to one subscription, retrying per
/// `subscription.retry_config` with `initialDelayMs * backoffMultiplier^(attempt-1)`.
/// Headers carry the source job id, event name, and attempt count so
/// receivers can dedup; the engine itself does not guarantee exactly-once.
pub async fn deliver_with_retry(http: &Client, subscription: &Subscription, event: LifecycleEvent, job_id: Uuid, data: &serde_json::Value) -> DeliveryOutcome {
    let timestamp = Utc::now().timestamp().to_string();
    let body = serde_json::to_string(&WebhookEnvelope { event: event.name(), timestamp: Utc::now().timestamp(), data }).unwrap_or_default();
    let signature = sign(&subscription.secret, &timestamp, &body);
    let delivery_id = Uuid::new_v4();

    let max_attempts = subscription.retry_config.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let mut builder = match subscription.method {
            HttpMethod::Post => http.post(&subscription.url),
            HttpMethod::Put => http.put(&subscription.url),
        };
        builder = builder
            .header("Content-Type", "application/json")
            .header("X-Mech-Signature", &signature)
            .header("X-Mech-Timestamp", &timestamp)
            .header("X-Mech-Event", event.name())
            .header("X-Mech-Delivery-Id", delivery_id.to_string())
            .header("X-Mech-Attempt", attempt.to_string())
            .body(body.clone())
            .timeout(Duration::from_secs(10));

        match builder.send().await {
            Ok(response) if response.status().is_success() => {
                return DeliveryOutcome { succeeded: true, attempts: attempt };
            }
            _ => {
                if attempt < max_attempts {
                    let delay_ms = (subscription.retry_config.initial_delay_ms as f64
                        * subscription.retry_config.backoff_multiplier.powi(attempt as i32 - 1)) as u64;
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }
    DeliveryOutcome { succeeded: false, attempts: max_attempts }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serialises_event_name() {
        let data = serde_json::json!({"jobId": "abc"});
        let envelope = WebhookEnvelope { event: "job.completed", timestamp: 1700000000, data: &data };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"event\":\"job.completed\""));
    }
}
