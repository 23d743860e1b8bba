//! Database access for tpa-service
//!
//! SQLite via sqlx. JSON-shaped fields are stored as TEXT, timestamps as
//! RFC 3339, identifiers as UUID text.

pub mod files;
pub mod jobs;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tpa_common::{Error, Result};
use uuid::Uuid;

pub use jobs::TransitionOutcome;

/// SQLite busy handler timeout per statement
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on `retry_on_lock` for contended job writes
pub const MAX_LOCK_WAIT_MS: u64 = 5000;

/// Initialize database connection pool
///
/// Creates the database file (and its parent directory) when missing, then
/// the tables.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::debug!(path = %db_path.display(), "Connecting to database");
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Create `files` and `analysis_jobs` if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            filepath TEXT NOT NULL,
            filetype TEXT NOT NULL,
            filesize INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            metadata TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_jobs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            parameters TEXT NOT NULL,
            file_ids TEXT NOT NULL,
            status TEXT NOT NULL,
            results TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analysis_jobs_status ON analysis_jobs(status)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (files, analysis_jobs)");
    Ok(())
}

pub(crate) fn to_json<T: Serialize>(value: &T, field: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", field, e)))
}

pub(crate) fn from_json<T: DeserializeOwned>(text: &str, field: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", field, e)))
}

pub(crate) fn parse_uuid(text: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

pub(crate) fn parse_timestamp(text: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}
