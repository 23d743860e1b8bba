//! Job deadline watchdog
//!
//! Sleeps for the deadline, then fails the job only if it is still RUNNING.
//! Does not cancel in-flight work; a computation that finishes later finds the
//! job terminal and its completion is discarded.

use sqlx::SqlitePool;
use std::time::Duration;
use tpa_common::events::{EventBus, TpaEvent};
use tpa_common::{JobStatus, Result};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db;
use crate::db::TransitionOutcome;
use crate::services::job_manager::JobError;

/// Wait `deadline`, then force a still-running job to FAILED
pub async fn supervise_timeout(
    db: SqlitePool,
    events: EventBus,
    job_id: Uuid,
    deadline: Duration,
) -> Result<TransitionOutcome> {
    tokio::time::sleep(deadline).await;

    let message = JobError::TimedOut(deadline.as_secs()).to_string();
    let outcome = db::jobs::fail_if_running(&db, job_id, &message).await?;

    match outcome {
        TransitionOutcome::Applied => {
            warn!(
                job_id = %job_id,
                deadline_seconds = deadline.as_secs(),
                "Analysis job timed out"
            );
            let timestamp = chrono::Utc::now();
            events.emit_lossy(TpaEvent::JobTimedOut {
                job_id,
                deadline_seconds: deadline.as_secs(),
                timestamp,
            });
            events.emit_lossy(TpaEvent::JobStatusChanged {
                job_id,
                old_status: JobStatus::Running,
                new_status: JobStatus::Failed,
                error_message: Some(message),
                timestamp,
            });
        }
        TransitionOutcome::Superseded(status) => {
            debug!(job_id = %job_id, status = %status, "Job not running at deadline");
        }
        TransitionOutcome::NotFound => {
            debug!(job_id = %job_id, "Job deleted before deadline");
        }
    }
    Ok(outcome)
}
