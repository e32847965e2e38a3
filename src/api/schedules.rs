use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::schedule::{EndpointAction, RetryPolicy, ScheduleTrigger};
use crate::models::Schedule;

use super::{created, ok, ApiResponse, AppState, RequestContext};

#[derive(Deserialize)]
pub struct CreateScheduleRequest {
    name: String,
    trigger: ScheduleTrigger,
    end_date: Option<chrono::DateTime<chrono::Utc>>,
    limit: Option<u32>,
    endpoint: EndpointAction,
    retry_policy: Option<RetryPolicy>,
}

pub async fn create_schedule(State(state): State<AppState>, ctx: RequestContext, Json(body): Json<CreateScheduleRequest>) -> Response {
    let retry_policy = body.retry_policy.unwrap_or_else(|| RetryPolicy::builder().build());
    let schedule = Schedule::builder()
        .name(body.name)
        .application_id(ctx.tenant_id.clone())
        .trigger(body.trigger)
        .end_date(body.end_date)
        .limit(body.limit)
        .endpoint(body.endpoint)
        .retry_policy(retry_policy)
        .created_by(ctx.tenant_id.clone())
        .build();
    match state.kernel.scheduler.create(schedule).await {
        Ok(schedule) => created(schedule),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}

pub async fn list_schedules(State(state): State<AppState>) -> Response {
    ok(state.kernel.scheduler.list().await)
}

pub async fn get_schedule(State(state): State<AppState>, ctx: RequestContext, Path(id): Path<Uuid>) -> Response {
    match state.kernel.scheduler.get(id).await {
        Ok(schedule) => ok(schedule),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}

#[derive(Deserialize)]
pub struct UpdateScheduleRequest {
    endpoint: Option<EndpointAction>,
    retry_policy: Option<RetryPolicy>,
    end_date: Option<chrono::DateTime<chrono::Utc>>,
    limit: Option<u32>,
}

pub async fn update_schedule(State(state): State<AppState>, ctx: RequestContext, Path(id): Path<Uuid>, Json(body): Json<UpdateScheduleRequest>) -> Response {
    let result = state
        .kernel
        .scheduler
        .update(id, |schedule| {
            if let Some(endpoint) = body.endpoint.clone() {
                schedule.endpoint = endpoint;
            }
            if let Some(retry_policy) = body.retry_policy {
                schedule.retry_policy = retry_policy;
            }
            schedule.end_date = body.end_date;
            schedule.limit = body.limit;
        })
        .await;
    match result {
        Ok(schedule) => ok(schedule),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}

pub async fn delete_schedule(State(state): State<AppState>, ctx: RequestContext, Path(id): Path<Uuid>) -> Response {
    match state.kernel.scheduler.delete(id).await {
        Ok(()) => ok(serde_json::json!({ "deleted": true })),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}

pub async fn execute_schedule(State(state): State<AppState>, ctx: RequestContext, Path(id): Path<Uuid>) -> Response {
    match state.kernel.scheduler.execute_now(id).await {
        Ok(schedule) => ok(schedule),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}

#[derive(Deserialize)]
pub struct ToggleScheduleRequest {
    enabled: bool,
}

pub async fn toggle_schedule(State(state): State<AppState>, ctx: RequestContext, Path(id): Path<Uuid>, Json(body): Json<ToggleScheduleRequest>) -> Response {
    match state.kernel.scheduler.toggle(id, body.enabled).await {
        Ok(schedule) => ok(schedule),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}
