//! Analysis job database operations
//!
//! Status changes are single conditional updates guarded by the expected
//! prior status. Whichever writer reaches a terminal state first wins; a later
//! writer sees zero affected rows and gets [`TransitionOutcome::Superseded`].

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tpa_common::{JobStatus, Result};
use uuid::Uuid;

use super::{from_json, parse_timestamp, parse_uuid, to_json, MAX_LOCK_WAIT_MS};
use crate::models::{AnalysisJob, ResultsBundle};
use crate::utils::retry_on_lock;

const JOB_COLUMNS: &str = "id, name, description, parameters, file_ids, status, results, \
                           error_message, created_at, updated_at";

/// Result of a conditional status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Row updated
    Applied,
    /// Row exists but was no longer in an expected prior status
    Superseded(JobStatus),
    /// Row does not exist (deleted concurrently)
    NotFound,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

/// Insert a freshly submitted job
pub async fn insert_job(pool: &SqlitePool, job: &AnalysisJob) -> Result<()> {
    let parameters = to_json(&job.parameters, "parameters")?;
    let file_ids = to_json(&job.file_ids, "file_ids")?;
    let results = job
        .results
        .as_ref()
        .map(|r| to_json(r, "results"))
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO analysis_jobs (
            id, name, description, parameters, file_ids, status,
            results, error_message, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job.id.to_string())
    .bind(&job.name)
    .bind(&job.description)
    .bind(parameters)
    .bind(file_ids)
    .bind(job.status.as_str())
    .bind(results)
    .bind(&job.error_message)
    .bind(job.created_at.to_rfc3339())
    .bind(job.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a job by id
pub async fn get_job(pool: &SqlitePool, id: Uuid) -> Result<Option<AnalysisJob>> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM analysis_jobs WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|row| job_from_row(&row)).transpose()
}

/// Current status of a job, `None` if it does not exist
pub async fn get_status(pool: &SqlitePool, id: Uuid) -> Result<Option<JobStatus>> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM analysis_jobs WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    status.map(|s| s.parse()).transpose()
}

/// List jobs, newest first
pub async fn list_jobs(pool: &SqlitePool, skip: u32, limit: u32) -> Result<Vec<AnalysisJob>> {
    let rows = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM analysis_jobs ORDER BY created_at DESC, id LIMIT ? OFFSET ?"
    ))
    .bind(i64::from(limit))
    .bind(i64::from(skip))
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Delete a job at any status, returning whether one existed
pub async fn delete_job(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM analysis_jobs WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// pending → running
pub async fn mark_running(pool: &SqlitePool, id: Uuid) -> Result<TransitionOutcome> {
    transition(pool, id, JobStatus::Running, None, None).await
}

/// running → completed, writing the results bundle in the same statement
pub async fn complete_job(
    pool: &SqlitePool,
    id: Uuid,
    results: &ResultsBundle,
) -> Result<TransitionOutcome> {
    let results = to_json(results, "results")?;
    transition(pool, id, JobStatus::Completed, Some(results), None).await
}

/// pending | running → failed, writing the error message in the same statement
pub async fn fail_job(pool: &SqlitePool, id: Uuid, message: &str) -> Result<TransitionOutcome> {
    transition(pool, id, JobStatus::Failed, None, Some(message)).await
}

/// running → failed only; used by the timeout supervisor
pub async fn fail_if_running(
    pool: &SqlitePool,
    id: Uuid,
    message: &str,
) -> Result<TransitionOutcome> {
    conditional_update(
        pool,
        id,
        &[JobStatus::Running],
        JobStatus::Failed,
        None,
        Some(message),
    )
    .await
}

async fn transition(
    pool: &SqlitePool,
    id: Uuid,
    next: JobStatus,
    results: Option<String>,
    error_message: Option<&str>,
) -> Result<TransitionOutcome> {
    let expected = JobStatus::predecessors_of(next);
    conditional_update(pool, id, &expected, next, results, error_message).await
}

async fn conditional_update(
    pool: &SqlitePool,
    id: Uuid,
    expected: &[JobStatus],
    next: JobStatus,
    results: Option<String>,
    error_message: Option<&str>,
) -> Result<TransitionOutcome> {
    let placeholders = vec!["?"; expected.len()].join(", ");
    let sql = format!(
        "UPDATE analysis_jobs SET status = ?, results = ?, error_message = ?, updated_at = ? \
         WHERE id = ? AND status IN ({placeholders})"
    );
    let id_text = id.to_string();

    let affected = retry_on_lock(&format!("job -> {next}"), MAX_LOCK_WAIT_MS, || {
        let mut query = sqlx::query(&sql)
            .bind(next.as_str())
            .bind(results.as_deref())
            .bind(error_message)
            .bind(Utc::now().to_rfc3339())
            .bind(&id_text);
        for status in expected {
            query = query.bind(status.as_str());
        }
        async move { Ok(query.execute(pool).await?.rows_affected()) }
    })
    .await?;

    if affected > 0 {
        return Ok(TransitionOutcome::Applied);
    }
    Ok(match get_status(pool, id).await? {
        Some(current) => TransitionOutcome::Superseded(current),
        None => TransitionOutcome::NotFound,
    })
}

fn job_from_row(row: &SqliteRow) -> Result<AnalysisJob> {
    let id: String = row.get("id");
    let parameters: String = row.get("parameters");
    let file_ids: String = row.get("file_ids");
    let status: String = row.get("status");
    let results: Option<String> = row.get("results");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(AnalysisJob {
        id: parse_uuid(&id, "job id")?,
        name: row.get("name"),
        description: row.get("description"),
        parameters: from_json(&parameters, "parameters")?,
        file_ids: from_json(&file_ids, "file_ids")?,
        status: status.parse()?,
        results: results
            .map(|text| from_json(&text, "results"))
            .transpose()?,
        error_message: row.get("error_message"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisParameters;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        // one connection so every query sees the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        super::super::init_tables(&pool).await.unwrap();
        pool
    }

    async fn pending_job(pool: &SqlitePool) -> AnalysisJob {
        let job = AnalysisJob::new(
            "Road test".to_string(),
            None,
            AnalysisParameters::default(),
            vec![Uuid::new_v4()],
        );
        insert_job(pool, &job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn test_insert_and_load_job() {
        let pool = test_pool().await;
        let job = pending_job(&pool).await;

        let loaded = get_job(&pool, job.id).await.unwrap().expect("job exists");
        assert_eq!(loaded.name, "Road test");
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.file_ids, job.file_ids);
        assert!(loaded.results.is_none());
        assert_eq!(get_status(&pool, job.id).await.unwrap(), Some(JobStatus::Pending));
    }

    #[tokio::test]
    async fn test_first_terminal_write_wins() {
        let pool = test_pool().await;
        let job = pending_job(&pool).await;

        assert_eq!(mark_running(&pool, job.id).await.unwrap(), TransitionOutcome::Applied);
        assert_eq!(
            mark_running(&pool, job.id).await.unwrap(),
            TransitionOutcome::Superseded(JobStatus::Running)
        );

        let outcome = fail_if_running(&pool, job.id, "Analysis timed out after 300 seconds")
            .await
            .unwrap();
        assert!(outcome.is_applied());

        let late = complete_job(&pool, job.id, &ResultsBundle::default())
            .await
            .unwrap();
        assert_eq!(late, TransitionOutcome::Superseded(JobStatus::Failed));

        let stored = get_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.results.is_none());
        assert!(stored.is_consistent());
    }

    #[tokio::test]
    async fn test_supervisor_ignores_pending_and_completed() {
        let pool = test_pool().await;
        let job = pending_job(&pool).await;

        assert_eq!(
            fail_if_running(&pool, job.id, "timeout").await.unwrap(),
            TransitionOutcome::Superseded(JobStatus::Pending)
        );

        mark_running(&pool, job.id).await.unwrap();
        complete_job(&pool, job.id, &ResultsBundle::default())
            .await
            .unwrap();
        assert_eq!(
            fail_if_running(&pool, job.id, "timeout").await.unwrap(),
            TransitionOutcome::Superseded(JobStatus::Completed)
        );
        let stored = get_job(&pool, job.id).await.unwrap().unwrap();
        assert!(stored.results.is_some());
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_pending_job_can_fail_directly() {
        let pool = test_pool().await;
        let job = pending_job(&pool).await;

        assert!(fail_job(&pool, job.id, "No files found for analysis")
            .await
            .unwrap()
            .is_applied());
        let stored = get_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(stored.error_message.as_deref(), Some("No files found for analysis"));
    }

    #[tokio::test]
    async fn test_transition_on_deleted_job() {
        let pool = test_pool().await;
        let job = pending_job(&pool).await;

        assert!(delete_job(&pool, job.id).await.unwrap());
        assert!(!delete_job(&pool, job.id).await.unwrap());
        assert_eq!(
            mark_running(&pool, job.id).await.unwrap(),
            TransitionOutcome::NotFound
        );
    }
}
