use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::reasoning::{ReasoningSearchFilters, StepContent, StepContext, StepQuality, StepType};
use crate::models::ReasoningStep;

use super::{created, ok, ApiResponse, AppState, RequestContext};

#[derive(Deserialize)]
pub struct StoreStepRequest {
    session_id: Uuid,
    step_type: StepType,
    content: StepContent,
    context: Option<StepContext>,
    quality: Option<StepQuality>,
}

pub async fn store_step(State(state): State<AppState>, ctx: RequestContext, Json(body): Json<StoreStepRequest>) -> Response {
    let Some(project_id) = &ctx.project_id else {
        return ApiResponse(ApiError::validation("x-project-id header is required"), ctx.request_id).into_response();
    };
    state.kernel.sessions.get_or_create(body.session_id, project_id).await;

    let step = ReasoningStep::builder()
        .session_id(body.session_id)
        .step_type(body.step_type)
        .content(body.content)
        .context(body.context.unwrap_or_default())
        .quality(body.quality.unwrap_or_default())
        .build();
    match state.kernel.reasoning.store(step).await {
        Ok(step) => created(step),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}

pub async fn get_chain(State(state): State<AppState>, Path(session_id): Path<Uuid>) -> Response {
    ok(state.kernel.reasoning.get_chain(session_id).await)
}

#[derive(Deserialize)]
pub struct SearchStepsRequest {
    query: String,
    #[serde(default)]
    filters: ReasoningSearchFilters,
}

pub async fn search_steps(State(state): State<AppState>, Json(body): Json<SearchStepsRequest>) -> Response {
    ok(state.kernel.reasoning.search(&body.query, &body.filters).await)
}

pub async fn analyze_chain(State(state): State<AppState>, Path(session_id): Path<Uuid>) -> Response {
    ok(state.kernel.reasoning.analyze(session_id).await)
}
