//! API request and response types

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde::Serialize;
use tracing::error;

use crate::errors::RagRunError;
use crate::models::RunRecord;
use crate::models::RunStatus;
use crate::notify::HubStats;

/// Run submission body; `question` is optional so a missing one maps to a 400
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    #[serde(default)]
    pub question: Option<String>,
    /// Client-chosen id, e.g. to make a retried submission detectable
    #[serde(default)]
    pub run_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunResponse {
    pub run_id: String,
    pub status: RunStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

const fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub runs: Vec<RunRecord>,
    pub count: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub hub: HubStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error returned by handlers, rendered as `{ "error": "..." }`
#[derive(Debug)]
pub struct ApiError(pub RagRunError);

impl ApiError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match &self.0 {
            RagRunError::Validation(_) => StatusCode::BAD_REQUEST,
            RagRunError::RunNotFound(_) => StatusCode::NOT_FOUND,
            RagRunError::DuplicateRun(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RagRunError> for ApiError {
    fn from(err: RagRunError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
