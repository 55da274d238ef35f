//! HTTP surface over the orchestrator.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::curator::TrendReport;
use crate::error::PipelineError;
use crate::metrics::Metrics;
use crate::model::{AgentTask, AgentType, Priority, Source, TaskPayload};
use crate::orchestrator::{period, DeadLetter, HealthReport, Orchestrator};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn create_router(orchestrator: Arc<Orchestrator>, metrics: Option<Metrics>) -> Router {
    let state = AppState { orchestrator };
    let api = Router::new()
        .route("/health", get(health))
        .route("/tasks", post(submit_task))
        .route("/tasks/dead", get(dead_tasks))
        .route("/tasks/{id}", get(task_status))
        .route("/sources", get(sources))
        .route("/discovery/trigger", post(trigger_discovery))
        .route("/newsletter/trigger", post(trigger_newsletter))
        .route("/trends", get(trends))
        .layer(CorsLayer::very_permissive())
        .with_state(state);
    match metrics {
        Some(m) => api.merge(m.router()),
        None => api,
    }
}

/// `PipelineError` as an HTTP response.
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::UnknownTask(_) => StatusCode::NOT_FOUND,
            PipelineError::InsufficientContent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::AlreadyRunning(_) | PipelineError::DuplicateArtifact(_) => {
                StatusCode::CONFLICT
            }
            PipelineError::AgentUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Serialize)]
struct Accepted {
    task_id: String,
}

fn accepted(task_id: String) -> (StatusCode, Json<Accepted>) {
    (StatusCode::ACCEPTED, Json(Accepted { task_id }))
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.orchestrator.health_check())
}

#[derive(Deserialize)]
struct SubmitReq {
    agent_type: String,
    #[serde(default)]
    priority: Option<u8>,
    payload: serde_json::Value,
}

/// Body is parsed by hand so that malformed tasks map to 400, not 422.
async fn submit_task(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<(StatusCode, Json<Accepted>)> {
    let req: SubmitReq = serde_json::from_value(body)
        .map_err(|e| PipelineError::Validation(format!("malformed task: {e}")))?;
    let agent: AgentType = req.agent_type.parse()?;
    let payload: TaskPayload = serde_json::from_value(req.payload)
        .map_err(|e| PipelineError::Validation(format!("malformed payload: {e}")))?;
    let priority = req.priority.map(Priority).unwrap_or_default();
    let id = state.orchestrator.submit_task(agent, priority, payload)?;
    Ok(accepted(id))
}

async fn task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AgentTask>> {
    Ok(Json(state.orchestrator.get_task_status(&id)?))
}

async fn dead_tasks(State(state): State<AppState>) -> Json<Vec<DeadLetter>> {
    Json(state.orchestrator.dead_letters())
}

async fn sources(State(state): State<AppState>) -> Json<Vec<Source>> {
    Json(state.orchestrator.get_source_metrics())
}

async fn trigger_discovery(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<Accepted>)> {
    Ok(accepted(state.orchestrator.trigger_discovery()?))
}

#[derive(Deserialize, Default)]
struct NewsletterReq {
    #[serde(default)]
    period_key: Option<String>,
}

/// Without a `period_key`, composes the current scheduled period.
async fn trigger_newsletter(
    State(state): State<AppState>,
    body: Option<Json<NewsletterReq>>,
) -> ApiResult<(StatusCode, Json<Accepted>)> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let key = req.period_key.unwrap_or_else(|| {
        period::period_key_for(Utc::now(), state.orchestrator.config().newsletter_interval)
    });
    Ok(accepted(state.orchestrator.trigger_composition(&key).await?))
}

#[derive(Deserialize)]
struct TrendsQuery {
    days: Option<u32>,
}

async fn trends(
    State(state): State<AppState>,
    Query(q): Query<TrendsQuery>,
) -> ApiResult<Json<TrendReport>> {
    let days = q.days.unwrap_or(7).clamp(1, 365);
    Ok(Json(state.orchestrator.trends(days).await?))
}
