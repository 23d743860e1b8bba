//! Upload-time file ingestion
//!
//! Order of checks: extension (no I/O) → size → write bytes → extract metadata →
//! persist record. Any failure after the write removes the stored bytes so no
//! orphaned upload is left behind.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tpa_common::events::{EventBus, TpaEvent};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::formats::{detect_format, IngestError};
use crate::models::FileRecord;
use crate::services::metadata_extractor::extract_metadata;

/// Upload rejection reasons
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("File of {size} bytes exceeds maximum upload size of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error(transparent)]
    Storage(#[from] tpa_common::Error),
}

/// File ingestion service
#[derive(Clone)]
pub struct FileIngestService {
    db: SqlitePool,
    events: EventBus,
    upload_folder: PathBuf,
    max_upload_bytes: u64,
}

impl FileIngestService {
    pub fn new(
        db: SqlitePool,
        events: EventBus,
        upload_folder: PathBuf,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            db,
            events,
            upload_folder,
            max_upload_bytes,
        }
    }

    /// Store an uploaded file and persist its record
    pub async fn ingest_upload(&self, filename: &str, bytes: &[u8]) -> Result<FileRecord, UploadError> {
        let basename = sanitize_filename(filename);
        let kind = detect_format(&basename)
            .ok_or_else(|| IngestError::UnsupportedFormat(filename.to_string()))?;

        let size = bytes.len() as u64;
        if size > self.max_upload_bytes {
            return Err(UploadError::TooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }

        let file_id = Uuid::new_v4();
        tokio::fs::create_dir_all(&self.upload_folder)
            .await
            .map_err(IngestError::Io)?;
        let stored_path = self.upload_folder.join(format!("{file_id}-{basename}"));
        tokio::fs::write(&stored_path, bytes)
            .await
            .map_err(IngestError::Io)?;

        let extraction = {
            let path = stored_path.clone();
            tokio::task::spawn_blocking(move || extract_metadata(&path, kind)).await
        };
        let metadata = match extraction {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => {
                remove_stored(&stored_path).await;
                return Err(e.into());
            }
            Err(join_error) => {
                remove_stored(&stored_path).await;
                return Err(IngestError::unreadable(&stored_path, join_error.to_string()).into());
            }
        };

        let record = FileRecord {
            id: file_id,
            ..FileRecord::new(
                basename,
                stored_path.clone(),
                kind,
                size,
                sha256_hex(bytes),
                metadata,
            )
        };
        if let Err(e) = db::files::save_file(&self.db, &record).await {
            remove_stored(&stored_path).await;
            return Err(e.into());
        }

        info!(
            file_id = %record.id,
            filename = %record.filename,
            filetype = %kind,
            filesize = size,
            "File ingested"
        );
        self.events.emit_lossy(TpaEvent::FileIngested {
            file_id: record.id,
            filename: record.filename.clone(),
            file_type: kind.to_string(),
            timestamp: record.created_at,
        });
        Ok(record)
    }

    /// Delete a file record and its stored bytes
    ///
    /// Returns `false` if no such record exists. Missing bytes are ignored.
    pub async fn delete(&self, file_id: Uuid) -> tpa_common::Result<bool> {
        let Some(record) = db::files::get_file(&self.db, file_id).await? else {
            return Ok(false);
        };
        if !db::files::delete_file(&self.db, file_id).await? {
            return Ok(false);
        }
        remove_stored(&record.filepath).await;

        info!(file_id = %file_id, "File deleted");
        self.events.emit_lossy(TpaEvent::FileDeleted {
            file_id,
            timestamp: chrono::Utc::now(),
        });
        Ok(true)
    }
}

/// Final path component with anything but `[A-Za-z0-9._-]` replaced by `_`
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

async fn remove_stored(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stored upload"),
    }
}
