//! Stored measurement file record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::formats::FileKind;
use crate::models::FileMetadata;

/// An ingested file
///
/// Created only after metadata extraction succeeded; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    /// Name as uploaded
    pub filename: String,
    /// Location of the stored bytes
    pub filepath: PathBuf,
    pub filetype: FileKind,
    /// Size in bytes
    pub filesize: u64,
    /// Hex SHA-256 of the stored bytes
    pub sha256: String,
    pub metadata: FileMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(
        filename: String,
        filepath: PathBuf,
        filetype: FileKind,
        filesize: u64,
        sha256: String,
        metadata: FileMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filename,
            filepath,
            filetype,
            filesize,
            sha256,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}
