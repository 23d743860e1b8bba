//! Analysis job record
//!
//! Lifecycle: pending → running → completed | failed (pending → failed also
//! allowed). Only the job manager and the timeout supervisor mutate a job,
//! and only through conditional status updates in `db::jobs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tpa_common::JobStatus;
use uuid::Uuid;

use crate::models::{AnalysisParameters, ResultsBundle};

/// A submitted analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub parameters: AnalysisParameters,
    /// Input files, in submission order
    pub file_ids: Vec<Uuid>,
    pub status: JobStatus,
    /// Present iff `status == Completed`
    pub results: Option<ResultsBundle>,
    /// Present iff `status == Failed`
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    /// New job in `pending` state
    pub fn new(
        name: String,
        description: Option<String>,
        parameters: AnalysisParameters,
        file_ids: Vec<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            parameters,
            file_ids,
            status: JobStatus::Pending,
            results: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Status, results and error message agree with each other
    pub fn is_consistent(&self) -> bool {
        let has_error = self
            .error_message
            .as_deref()
            .is_some_and(|message| !message.is_empty());
        (self.results.is_some() == (self.status == JobStatus::Completed))
            && (has_error == (self.status == JobStatus::Failed))
    }
}
