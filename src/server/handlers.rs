use super::AppState;
use crate::domain::model::ArchivedRoundSummary;
use crate::utils::error::AppraisalError;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub since: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub since: NaiveDate,
    pub rounds: Vec<ArchivedRoundSummary>,
}

/// Error body: the same `{kind, message}` pair the WebSocket `error` event carries.
pub struct ApiError(pub AppraisalError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppraisalError::EngineStopped | AppraisalError::StorageUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "kind": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<AppraisalError> for ApiError {
    fn from(err: AppraisalError) -> Self {
        ApiError(err)
    }
}

/// `GET /health`
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// `GET /api/snapshot`
pub async fn snapshot_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.handle.snapshot().await?;
    Ok(Json(snapshot))
}

/// `GET /api/history?since=YYYY-MM-DD`, defaulting to today.
pub async fn history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let since = query.since.unwrap_or_else(|| Local::now().date_naive());
    let rounds = state.archive.list_archived_rounds(since).await.map_err(|e| {
        tracing::error!("❌ Failed to read archive: {}", e);
        ApiError(e)
    })?;
    Ok(Json(HistoryResponse { since, rounds }))
}
