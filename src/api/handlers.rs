/// API request handlers
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::api::types::ApiError;
use crate::api::types::CreateRunRequest;
use crate::api::types::CreateRunResponse;
use crate::api::types::HealthResponse;
use crate::api::types::ListRunsQuery;
use crate::api::types::RunListResponse;
use crate::errors::RagRunError;
use crate::models::new_run_id;
use crate::models::RunRecord;
use crate::models::RunStatus;
use crate::notify::NotificationHub;
use crate::pipeline::PipelineController;
use crate::store::RunStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RunStore>,
    pub controller: Arc<PipelineController>,
    pub hub: Arc<NotificationHub>,
}

impl AppState {
    /// The store is taken from the controller so both always agree
    #[must_use]
    pub fn new(controller: Arc<PipelineController>, hub: Arc<NotificationHub>) -> Self {
        Self {
            store: Arc::clone(controller.store()),
            controller,
            hub,
        }
    }
}

/// Health check handler
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        hub: state.hub.stats().await,
    })
}

/// Create a run and start it in the background (POST /api/runs)
///
/// Responds `202 Accepted` as soon as the record exists; the run itself
/// may not have started yet.
pub async fn create_run(
    State(state): State<AppState>,
    payload: Result<Json<CreateRunRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateRunResponse>), ApiError> {
    let Json(request) =
        payload.map_err(|rejection| RagRunError::Validation(rejection.body_text()))?;

    let question = request
        .question
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| RagRunError::Validation("Question is required".to_string()))?;
    let run_id = request.run_id.unwrap_or_else(new_run_id);

    info!("POST /api/runs ({})", run_id);
    let (record, _handle) = state.controller.submit(&run_id, &question).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateRunResponse {
            run_id: record.id,
            status: record.status,
        }),
    ))
}

/// Current state of a run (GET /api/runs/:id)
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunRecord>, ApiError> {
    Ok(Json(state.store.load_run(&run_id).await?))
}

/// Newest runs first (GET /api/runs?status=&limit=)
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<RunListResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<RunStatus>)
        .transpose()?;

    let runs = state.store.list_runs(status, query.limit).await?;
    Ok(Json(RunListResponse {
        count: runs.len(),
        runs,
    }))
}
