use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    broker: &'static str,
    event_bus: EventBusHealth,
}

#[derive(Serialize)]
struct EventBusHealth {
    subscriber_count: usize,
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = HealthResponse {
        status: "healthy",
        broker: "ok",
        event_bus: EventBusHealth { subscriber_count: state.kernel.events.subscriber_count() },
    };
    (StatusCode::OK, axum::Json(body))
}

/// Text exposition format, grounded on the reference service's habit of
/// keeping `/health` JSON and `/metrics` plain text side by side.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let schedules = state.kernel.scheduler.list().await.len();
    let subscriptions = state.kernel.webhooks.list_subscriptions().await.len();
    let body = format!(
        "# HELP mech_dispatch_schedules_total Declared schedules\n\
         # TYPE mech_dispatch_schedules_total gauge\n\
         mech_dispatch_schedules_total {schedules}\n\
         # HELP mech_dispatch_subscriptions_total Declared webhook subscriptions\n\
         # TYPE mech_dispatch_subscriptions_total gauge\n\
         mech_dispatch_subscriptions_total {subscriptions}\n\
         # HELP mech_dispatch_event_bus_subscribers Active event bus subscribers\n\
         # TYPE mech_dispatch_event_bus_subscribers gauge\n\
         mech_dispatch_event_bus_subscribers {}\n",
        state.kernel.events.subscriber_count(),
    );
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body)
}
