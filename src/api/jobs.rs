use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::JobOptions;

use super::{ok, ApiResponse, AppState, RequestContext};

#[derive(Deserialize)]
pub struct SubmitJobRequest {
    data: serde_json::Value,
    options: Option<JobOptions>,
}

#[derive(Serialize)]
struct SubmitJobResponse {
    job_id: Uuid,
}

pub async fn submit_job(State(state): State<AppState>, ctx: RequestContext, Path(queue): Path<String>, Json(body): Json<SubmitJobRequest>) -> Response {
    match state.kernel.submit_job(&queue, &ctx.tenant_id, body.data, body.options).await {
        Ok(job_id) => ok(SubmitJobResponse { job_id }),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}

pub async fn get_job(State(state): State<AppState>, ctx: RequestContext, Path((queue, id)): Path<(String, Uuid)>) -> Response {
    match state.kernel.dispatcher.status(&queue, id).await {
        Ok(Some(job)) => ok(job),
        Ok(None) => ApiResponse(crate::error::ApiError::not_found(format!("job {id} not found")), ctx.request_id).into_response(),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}

pub async fn cancel_job(State(state): State<AppState>, ctx: RequestContext, Path((queue, id)): Path<(String, Uuid)>) -> Response {
    match state.kernel.dispatcher.cancel(&queue, id).await {
        Ok(()) => ok(serde_json::json!({ "cancelled": true })),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}

pub async fn queue_stats(State(state): State<AppState>, ctx: RequestContext, Path(queue): Path<String>) -> Response {
    match state.kernel.dispatcher.stats(&queue).await {
        Ok(counts) => ok(counts),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}

pub async fn pause_queue(State(state): State<AppState>, ctx: RequestContext, Path(queue): Path<String>) -> Response {
    match state.kernel.dispatcher.pause(&queue).await {
        Ok(()) => ok(serde_json::json!({ "paused": true })),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}

pub async fn resume_queue(State(state): State<AppState>, ctx: RequestContext, Path(queue): Path<String>) -> Response {
    match state.kernel.dispatcher.resume(&queue).await {
        Ok(()) => ok(serde_json::json!({ "paused": false })),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}
