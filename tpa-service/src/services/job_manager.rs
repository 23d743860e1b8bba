//! Analysis job lifecycle
//!
//! Submission inserts a PENDING job and spawns two independent tasks against it:
//! the runner (`run_job`) and the timeout supervisor. They coordinate only
//! through the job row's status; every status write is a conditional update, so
//! the first terminal write wins and the loser is a logged no-op.
//!
//! Ingestion and computation run on the blocking pool, never on the tasks
//! serving requests.

use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tpa_common::events::{EventBus, TpaEvent};
use tpa_common::JobStatus;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AnalysisSettings;
use crate::db;
use crate::db::TransitionOutcome;
use crate::formats::IngestError;
use crate::models::{AnalysisJob, AnalysisParameters, ResultsBundle};
use crate::services::data_loader::load_payload;
use crate::services::timeout_supervisor::supervise_timeout;
use crate::services::tpa_engine::{AnalysisEngine, AnalysisError};

/// Reasons a job ends FAILED
///
/// `Display` output is what gets persisted as the job's `error_message`.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("No files found for analysis")]
    NoFiles,

    #[error("Error loading data from files: {0}")]
    Ingestion(IngestError),

    #[error("Error performing TPA analysis: {0}")]
    Analysis(AnalysisError),

    #[error("Analysis timed out after {0} seconds")]
    TimedOut(u64),

    #[error("Analysis task aborted: {0}")]
    TaskPanicked(String),

    #[error("Error reading job inputs: {0}")]
    Storage(#[from] tpa_common::Error),
}

/// Handles of the two background tasks started for a job
pub struct Submission {
    pub job: AnalysisJob,
    pub runner: JoinHandle<()>,
    pub supervisor: JoinHandle<()>,
}

/// Job lifecycle manager
#[derive(Clone)]
pub struct JobManager {
    db: SqlitePool,
    events: EventBus,
    engine: Arc<dyn AnalysisEngine>,
    settings: AnalysisSettings,
}

impl JobManager {
    pub fn new(
        db: SqlitePool,
        events: EventBus,
        engine: Arc<dyn AnalysisEngine>,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            db,
            events,
            engine,
            settings,
        }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Persist a PENDING job, then start its runner and timeout supervisor
    pub async fn submit(
        &self,
        name: String,
        description: Option<String>,
        parameters: AnalysisParameters,
        file_ids: Vec<Uuid>,
    ) -> tpa_common::Result<Submission> {
        let job = AnalysisJob::new(name, description, parameters, file_ids);
        db::jobs::insert_job(&self.db, &job).await?;

        info!(
            job_id = %job.id,
            files = job.file_ids.len(),
            "Analysis job submitted"
        );
        self.events.emit_lossy(TpaEvent::JobSubmitted {
            job_id: job.id,
            name: job.name.clone(),
            timestamp: job.created_at,
        });

        let runner = {
            let manager = self.clone();
            let (job_id, file_ids, parameters) =
                (job.id, job.file_ids.clone(), job.parameters.clone());
            tokio::spawn(async move {
                if let Err(e) = manager.run_job(job_id, &file_ids, &parameters).await {
                    error!(job_id = %job_id, error = %e, "Job runner failed to record outcome");
                }
            })
        };

        let supervisor = {
            let (db, events, job_id, deadline) = (
                self.db.clone(),
                self.events.clone(),
                job.id,
                self.settings.job_timeout,
            );
            tokio::spawn(async move {
                if let Err(e) = supervise_timeout(db, events, job_id, deadline).await {
                    error!(job_id = %job_id, error = %e, "Timeout supervisor failed");
                }
            })
        };

        Ok(Submission {
            job,
            runner,
            supervisor,
        })
    }

    /// Drive one job from PENDING to a terminal state
    ///
    /// Returns `Ok` whenever the job's outcome was decided, including when the
    /// job vanished or another writer got there first. `Err` only for
    /// persistence failures while recording the outcome.
    pub async fn run_job(
        &self,
        job_id: Uuid,
        file_ids: &[Uuid],
        parameters: &AnalysisParameters,
    ) -> tpa_common::Result<()> {
        match db::jobs::mark_running(&self.db, job_id).await? {
            TransitionOutcome::Applied => {
                info!(job_id = %job_id, "Analysis job running");
                self.emit_transition(job_id, JobStatus::Pending, JobStatus::Running, None);
            }
            TransitionOutcome::NotFound => {
                info!(job_id = %job_id, "Job deleted before it started");
                return Ok(());
            }
            TransitionOutcome::Superseded(current) => {
                warn!(job_id = %job_id, status = %current, "Job already started, not running again");
                return Ok(());
            }
        }

        match self.execute(file_ids, parameters.clone()).await {
            Ok(results) => {
                let outcome = db::jobs::complete_job(&self.db, job_id, &results).await?;
                self.record(job_id, outcome, JobStatus::Completed, None);
            }
            Err(e) => {
                let message = e.to_string();
                warn!(job_id = %job_id, error = %message, "Analysis job failed");
                let outcome = db::jobs::fail_job(&self.db, job_id, &message).await?;
                self.record(job_id, outcome, JobStatus::Failed, Some(message));
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        file_ids: &[Uuid],
        parameters: AnalysisParameters,
    ) -> Result<ResultsBundle, JobError> {
        let files = db::files::get_files(&self.db, file_ids).await?;
        if files.is_empty() {
            return Err(JobError::NoFiles);
        }

        let limit = self.settings.matrix_element_limit;
        let payload = tokio::task::spawn_blocking(move || load_payload(&files, limit))
            .await
            .map_err(|e| JobError::TaskPanicked(e.to_string()))?
            .map_err(JobError::Ingestion)?;
        debug!(
            operational = payload.operational_data.len(),
            frf_matrices = payload.frf_matrices.len(),
            "Payload loaded"
        );

        let engine = Arc::clone(&self.engine);
        let results = tokio::task::spawn_blocking(move || engine.analyze(&payload, &parameters))
            .await
            .map_err(|e| JobError::TaskPanicked(e.to_string()))?
            .map_err(JobError::Analysis)?;

        // a stored bundle must read back, and JSON cannot hold NaN or infinity
        if let Some(section) = results.first_non_finite() {
            return Err(JobError::Analysis(AnalysisError::Computation(format!(
                "non-finite value in {section}"
            ))));
        }
        Ok(results)
    }

    fn record(
        &self,
        job_id: Uuid,
        outcome: TransitionOutcome,
        next: JobStatus,
        error_message: Option<String>,
    ) {
        match outcome {
            TransitionOutcome::Applied => {
                info!(job_id = %job_id, status = %next, "Analysis job finished");
                self.emit_transition(job_id, JobStatus::Running, next, error_message);
            }
            TransitionOutcome::Superseded(current) => {
                warn!(
                    job_id = %job_id,
                    status = %current,
                    discarded = %next,
                    "Job already terminal, late outcome discarded"
                );
            }
            TransitionOutcome::NotFound => {
                info!(job_id = %job_id, "Job deleted while running, outcome dropped");
            }
        }
    }

    fn emit_transition(
        &self,
        job_id: Uuid,
        old_status: JobStatus,
        new_status: JobStatus,
        error_message: Option<String>,
    ) {
        self.events.emit_lossy(TpaEvent::JobStatusChanged {
            job_id,
            old_status,
            new_status,
            error_message,
            timestamp: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_keep_cause_verbatim() {
        assert_eq!(JobError::NoFiles.to_string(), "No files found for analysis");
        assert_eq!(
            JobError::Ingestion(IngestError::NoUsableData).to_string(),
            "Error loading data from files: No usable data could be loaded from the selected files"
        );
        assert_eq!(
            JobError::Analysis(AnalysisError::Computation("matrix singular".to_string()))
                .to_string(),
            "Error performing TPA analysis: matrix singular"
        );
        assert_eq!(
            JobError::TimedOut(300).to_string(),
            "Analysis timed out after 300 seconds"
        );
    }
}
