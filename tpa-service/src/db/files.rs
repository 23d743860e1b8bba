//! File record database operations

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use tpa_common::{Error, Result};
use uuid::Uuid;

use super::{from_json, parse_timestamp, parse_uuid, to_json};
use crate::formats::FileKind;
use crate::models::FileRecord;

const FILE_COLUMNS: &str =
    "id, filename, filepath, filetype, filesize, sha256, metadata, created_at, updated_at";

/// Insert a new file record
pub async fn save_file(pool: &SqlitePool, file: &FileRecord) -> Result<()> {
    let metadata = to_json(&file.metadata, "metadata")?;

    sqlx::query(
        r#"
        INSERT INTO files (id, filename, filepath, filetype, filesize, sha256, metadata, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(file.id.to_string())
    .bind(&file.filename)
    .bind(file.filepath.to_string_lossy().into_owned())
    .bind(file.filetype.as_str())
    .bind(file.filesize as i64)
    .bind(&file.sha256)
    .bind(metadata)
    .bind(file.created_at.to_rfc3339())
    .bind(file.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a file record by id
pub async fn get_file(pool: &SqlitePool, id: Uuid) -> Result<Option<FileRecord>> {
    let row = sqlx::query(&format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|row| file_from_row(&row)).transpose()
}

/// Load the records for `ids`, keeping their order
///
/// Ids with no record are dropped.
pub async fn get_files(pool: &SqlitePool, ids: &[Uuid]) -> Result<Vec<FileRecord>> {
    let mut files = Vec::with_capacity(ids.len());
    for id in ids {
        match get_file(pool, *id).await? {
            Some(file) => files.push(file),
            None => tracing::debug!(file_id = %id, "Referenced file no longer exists"),
        }
    }
    Ok(files)
}

/// List file records, oldest first
pub async fn list_files(pool: &SqlitePool, skip: u32, limit: u32) -> Result<Vec<FileRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM files ORDER BY created_at, id LIMIT ? OFFSET ?"
    ))
    .bind(i64::from(limit))
    .bind(i64::from(skip))
    .fetch_all(pool)
    .await?;

    rows.iter().map(file_from_row).collect()
}

/// Delete a file record, returning whether one existed
pub async fn delete_file(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn file_from_row(row: &SqliteRow) -> Result<FileRecord> {
    let id: String = row.get("id");
    let filetype: String = row.get("filetype");
    let filetype: FileKind = filetype
        .parse()
        .map_err(|e| Error::Internal(format!("Failed to parse filetype: {}", e)))?;
    let filepath: String = row.get("filepath");
    let metadata: String = row.get("metadata");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(FileRecord {
        id: parse_uuid(&id, "file id")?,
        filename: row.get("filename"),
        filepath: PathBuf::from(filepath),
        filetype,
        filesize: row.get::<i64, _>("filesize").max(0) as u64,
        sha256: row.get("sha256"),
        metadata: from_json(&metadata, "metadata")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}
