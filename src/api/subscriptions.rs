use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::subscription::{generate_secret, HttpMethod, LifecycleEvent, RetryConfig, SubscriptionFilters};
use crate::models::Subscription;

use super::{created, ok, ApiResponse, AppState, RequestContext};

#[derive(Deserialize)]
pub struct CreateSubscriptionRequest {
    url: String,
    method: Option<HttpMethod>,
    events: Vec<LifecycleEvent>,
    filters: Option<SubscriptionFilters>,
    retry_config: Option<RetryConfig>,
}

pub async fn create_subscription(State(state): State<AppState>, ctx: RequestContext, Json(body): Json<CreateSubscriptionRequest>) -> Response {
    let mut subscription = Subscription::builder()
        .application_id(ctx.tenant_id.clone())
        .url(body.url)
        .method(body.method.unwrap_or(HttpMethod::Post))
        .events(body.events)
        .filters(body.filters.unwrap_or_default())
        .secret(generate_secret())
        .retry_config(body.retry_config.unwrap_or_else(|| RetryConfig::builder().build()))
        .build();
    subscription.active = true;
    let created_subscription = state.kernel.webhooks.create_subscription(subscription).await;
    created(created_subscription)
}

pub async fn list_subscriptions(State(state): State<AppState>) -> Response {
    ok(state.kernel.webhooks.list_subscriptions().await)
}

pub async fn delete_subscription(State(state): State<AppState>, ctx: RequestContext, Path(id): Path<Uuid>) -> Response {
    match state.kernel.webhooks.delete_subscription(id).await {
        Ok(()) => ok(serde_json::json!({ "deleted": true })),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}
