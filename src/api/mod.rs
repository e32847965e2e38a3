//! Thin HTTP surface: deserialize, call into the `Kernel`, serialize the
//! `{success, data?, error?}` envelope. No request-validation DSL beyond
//! what `serde` gives for free, per the Non-goals.

pub mod code;
pub mod health;
pub mod jobs;
pub mod rate_limit;
pub mod reasoning;
pub mod schedules;
pub mod subscriptions;

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use rate_limit::ApiKeyExtractor;

use crate::common::RequestId;
use crate::config::Config;
use crate::error::{ApiError, ErrorCode};
use crate::kernel::Kernel;

#[derive(Clone)]
pub struct AppState {
    pub kernel: Arc<Kernel>,
}

/// Per-request identity read off `X-Api-Key`/`X-Session-Id`/`X-Project-Id`,
/// plus the request id (echoed back, generated if absent). The service
/// does not itself authenticate the key against a tenant table (out of
/// scope); handlers use `tenant_id` as the `applicationId` partition key.
pub struct RequestContext {
    pub tenant_id: String,
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    pub request_id: RequestId,
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

        let tenant_id = header("x-api-key").ok_or_else(|| ApiError::new(ErrorCode::AuthenticationError, "missing X-Api-Key header"))?;
        let request_id = header("x-request-id").and_then(|v| RequestId::parse(&v)).unwrap_or_default();

        Ok(Self { tenant_id, session_id: header("x-session-id"), project_id: header("x-project-id"), request_id })
    }
}

#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

#[derive(Serialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    request_id: RequestId,
}

pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(Envelope { success: true, data: Some(data), error: None })).into_response()
}

pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(Envelope { success: true, data: Some(data), error: None })).into_response()
}

pub struct ApiResponse(pub ApiError, pub RequestId);

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.code.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Envelope::<()> {
            success: false,
            data: None,
            error: Some(ErrorBody { code: self.0.code, message: self.0.message, timestamp: chrono::Utc::now(), request_id: self.1 }),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(kernel: Arc<Kernel>, config: &Config) -> Router {
    let state = AppState { kernel };

    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(tower_http::cors::Any).allow_methods(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = config.cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins).allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
    };

    // Per-tenant rate limit window from §5: burst equals the request
    // budget, refill interval spreads it evenly across the window.
    let max_requests = config.rate_limit_max_requests.max(1);
    let replenish_interval_ms = (config.rate_limit_window_ms / max_requests as u64).max(1);
    let mut governor_builder = GovernorConfigBuilder::default();
    governor_builder.key_extractor(ApiKeyExtractor).per_millisecond(replenish_interval_ms).burst_size(max_requests);
    let governor_config = Arc::new(governor_builder.finish().expect("rate limiter configuration is valid"));

    let api_routes = Router::new()
        .route("/api/jobs/:queue", post(jobs::submit_job))
        .route("/api/jobs/:queue/:id", get(jobs::get_job).delete(jobs::cancel_job))
        .route("/api/queues/:queue/stats", get(jobs::queue_stats))
        .route("/api/queues/:queue/pause", post(jobs::pause_queue))
        .route("/api/queues/:queue/resume", post(jobs::resume_queue))
        .route("/api/schedules", post(schedules::create_schedule).get(schedules::list_schedules))
        .route("/api/schedules/:id", get(schedules::get_schedule).put(schedules::update_schedule).delete(schedules::delete_schedule))
        .route("/api/schedules/:id/execute", post(schedules::execute_schedule))
        .route("/api/schedules/:id/toggle", patch(schedules::toggle_schedule))
        .route("/api/subscriptions", post(subscriptions::create_subscription).get(subscriptions::list_subscriptions))
        .route("/api/subscriptions/:id", delete(subscriptions::delete_subscription))
        .route("/api/reasoning/store", post(reasoning::store_step))
        .route("/api/reasoning/chain/:session_id", get(reasoning::get_chain))
        .route("/api/reasoning/search", post(reasoning::search_steps))
        .route("/api/reasoning/analyze/:session_id", post(reasoning::analyze_chain))
        .route("/api/code/search", post(code::search_code))
        .route("/api/code/index", post(code::index_code))
        .layer(GovernorLayer { config: governor_config });

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(health::metrics_handler))
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
