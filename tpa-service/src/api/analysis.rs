//! Analysis job endpoints
//!
//! POST /api/analysis, GET /api/analysis, GET|DELETE /api/analysis/:id

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::Pagination;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{AnalysisJob, AnalysisParameters};
use crate::AppState;

/// POST /api/analysis request
#[derive(Debug, Deserialize)]
pub struct CreateAnalysisRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: AnalysisParameters,
    #[serde(default)]
    pub file_ids: Vec<Uuid>,
}

/// POST /api/analysis
///
/// Returns the PENDING job immediately; the run happens in the background.
pub async fn create_analysis(
    State(state): State<AppState>,
    Json(request): Json<CreateAnalysisRequest>,
) -> ApiResult<(StatusCode, Json<AnalysisJob>)> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Analysis name must not be empty".to_string()));
    }

    let submission = state
        .jobs
        .submit(
            request.name,
            request.description,
            request.parameters,
            request.file_ids,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(submission.job)))
}

/// GET /api/analysis
pub async fn list_analyses(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<AnalysisJob>>> {
    Ok(Json(db::jobs::list_jobs(&state.db, page.skip, page.limit).await?))
}

/// GET /api/analysis/:id
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<AnalysisJob>> {
    db::jobs::get_job(&state.db, job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Analysis not found".to_string()))
}

/// DELETE /api/analysis/:id
///
/// Allowed at any status. A running job's runner finds the row gone and stops.
pub async fn delete_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    if !db::jobs::delete_job(&state.db, job_id).await? {
        return Err(ApiError::NotFound("Analysis not found".to_string()));
    }
    tracing::info!(job_id = %job_id, "Analysis deleted");
    Ok(Json(json!({ "message": "Analysis deleted successfully" })))
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analysis", get(list_analyses).post(create_analysis))
        .route("/api/analysis/:id", get(get_analysis).delete(delete_analysis))
}
