//! Results endpoints
//!
//! Read-only views of a job's results bundle. 404 when the job does not exist
//! or has no results (not completed).

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tpa_common::JobStatus;
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AnalysisJob, ContributionRow, ResultsBundle, RmsComparison, SystemResponsePoint, TransferFunctionPoint,
};
use crate::AppState;

/// Contribution rows within this distance of the requested frequency match
pub const FREQUENCY_MATCH_TOLERANCE: f64 = 0.1;

/// GET /api/results/:id/summary response
#[derive(Debug, Serialize)]
pub struct ResultsSummary {
    pub analysis_id: Uuid,
    pub name: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
pub struct ContributionQuery {
    pub frequency: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TransferFunctionQuery {
    pub path_id: Option<usize>,
}

/// The job and its results bundle, taken out of the job
async fn load_results(state: &AppState, job_id: Uuid) -> ApiResult<(AnalysisJob, ResultsBundle)> {
    let mut job = db::jobs::get_job(&state.db, job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Analysis not found".to_string()))?;
    let results = job
        .results
        .take()
        .ok_or_else(|| ApiError::NotFound("Results not available".to_string()))?;
    Ok((job, results))
}

/// GET /api/results/:id/summary
pub async fn get_summary(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<ResultsSummary>> {
    let (job, results) = load_results(&state, job_id).await?;
    Ok(Json(ResultsSummary {
        analysis_id: job.id,
        name: job.name,
        status: job.status,
        created_at: job.created_at,
        completed_at: job.updated_at,
        metrics: results.metrics,
    }))
}

/// GET /api/results/:id/contributions?frequency=
pub async fn get_contributions(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<ContributionQuery>,
) -> ApiResult<Json<Vec<ContributionRow>>> {
    let (_, results) = load_results(&state, job_id).await?;
    Ok(Json(filter_contributions(results.contributions, query.frequency)))
}

/// GET /api/results/:id/transfer-functions?path_id=
pub async fn get_transfer_functions(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<TransferFunctionQuery>,
) -> ApiResult<Json<Vec<TransferFunctionPoint>>> {
    let (_, results) = load_results(&state, job_id).await?;
    let mut points = results.transfer_functions;
    if let Some(path_id) = query.path_id {
        points.retain(|p| p.path_id == path_id);
    }
    Ok(Json(points))
}

/// GET /api/results/:id/system-response
pub async fn get_system_response(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Vec<SystemResponsePoint>>> {
    let (_, results) = load_results(&state, job_id).await?;
    Ok(Json(results.system_response))
}

/// GET /api/results/:id/rms-comparison
pub async fn get_rms_comparison(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Vec<RmsComparison>>> {
    let (_, results) = load_results(&state, job_id).await?;
    Ok(Json(results.rms_comparison))
}

/// GET /api/results/:id/performance-indicators
pub async fn get_performance_indicators(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<BTreeMap<String, f64>>> {
    let (_, results) = load_results(&state, job_id).await?;
    Ok(Json(results.performance_indicators))
}

fn filter_contributions(
    rows: Vec<ContributionRow>,
    frequency: Option<f64>,
) -> Vec<ContributionRow> {
    match frequency {
        Some(target) => rows
            .into_iter()
            .filter(|row| (row.frequency - target).abs() < FREQUENCY_MATCH_TOLERANCE)
            .collect(),
        None => rows,
    }
}

/// Build results routes
pub fn results_routes() -> Router<AppState> {
    Router::new()
        .route("/api/results/:id/summary", get(get_summary))
        .route("/api/results/:id/contributions", get(get_contributions))
        .route("/api/results/:id/transfer-functions", get(get_transfer_functions))
        .route("/api/results/:id/system-response", get(get_system_response))
        .route("/api/results/:id/rms-comparison", get(get_rms_comparison))
        .route(
            "/api/results/:id/performance-indicators",
            get(get_performance_indicators),
        )
}
