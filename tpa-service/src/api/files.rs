//! File endpoints
//!
//! POST /api/files/upload, GET /api/files, GET|DELETE /api/files/:id

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use super::Pagination;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::FileRecord;
use crate::AppState;

/// POST /api/files/upload
///
/// Multipart form with a `file` field.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<FileRecord>)> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("Uploaded file has no filename".to_string()))?;
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let record = state.ingest.ingest_upload(&filename, &bytes).await?;
        return Ok((StatusCode::CREATED, Json(record)));
    }
    Err(ApiError::BadRequest("No file provided".to_string()))
}

/// GET /api/files
pub async fn list_files(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<FileRecord>>> {
    Ok(Json(db::files::list_files(&state.db, page.skip, page.limit).await?))
}

/// GET /api/files/:id
pub async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> ApiResult<Json<FileRecord>> {
    db::files::get_file(&state.db, file_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))
}

/// DELETE /api/files/:id
pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    if !state.ingest.delete(file_id).await? {
        return Err(ApiError::NotFound("File not found".to_string()));
    }
    Ok(Json(json!({ "message": "File deleted successfully" })))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Build file routes
pub fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/api/files", get(list_files))
        .route("/api/files/upload", post(upload_file))
        .route("/api/files/:id", get(get_file).delete(delete_file))
}
