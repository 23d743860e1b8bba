//! Database and application state test utilities

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tpa_common::events::EventBus;
use tpa_service::config::ServiceSettings;
use tpa_service::models::{AnalysisJob, AnalysisParameters, AnalysisPayload, ResultsBundle};
use tpa_service::services::{AnalysisEngine, AnalysisError, TpaEngine};
use tpa_service::AppState;
use uuid::Uuid;

/// Create temporary test database with tables created
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let pool = tpa_service::db::init_database_pool(&temp_dir.path().join("tpa.db")).await?;
    Ok((temp_dir, pool))
}

/// Settings rooted in a temp dir with the given job deadline
pub fn test_settings(root: &TempDir, job_timeout: Duration) -> ServiceSettings {
    let mut settings = ServiceSettings::for_root(root.path());
    settings.analysis.job_timeout = job_timeout;
    settings
}

/// App state over a fresh temp database
///
/// `engine` defaults to the real `TpaEngine`.
pub async fn create_test_state(
    job_timeout: Duration,
    engine: Option<Arc<dyn AnalysisEngine>>,
) -> Result<(TempDir, AppState)> {
    let (temp_dir, pool) = create_test_db().await?;
    let settings = test_settings(&temp_dir, job_timeout);
    let engine = engine
        .unwrap_or_else(|| Arc::new(TpaEngine::new(settings.analysis.defaults)) as Arc<dyn AnalysisEngine>);
    let state = AppState::with_engine(pool, EventBus::new(100), settings, engine);
    Ok((temp_dir, state))
}

/// Poll until the job is terminal, panicking after `within`
pub async fn wait_for_terminal(pool: &SqlitePool, job_id: Uuid, within: Duration) -> AnalysisJob {
    let start = Instant::now();
    loop {
        let job = tpa_service::db::jobs::get_job(pool, job_id)
            .await
            .unwrap()
            .expect("job exists");
        if job.is_terminal() {
            return job;
        }
        assert!(
            start.elapsed() < within,
            "job {} still {} after {:?}",
            job_id,
            job.status,
            within
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Engine that blocks for `delay` before delegating to `TpaEngine`
pub struct StallingEngine {
    pub delay: Duration,
    pub inner: TpaEngine,
}

impl StallingEngine {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: TpaEngine::default(),
        }
    }
}

impl AnalysisEngine for StallingEngine {
    fn analyze(
        &self,
        payload: &AnalysisPayload,
        parameters: &AnalysisParameters,
    ) -> Result<ResultsBundle, AnalysisError> {
        std::thread::sleep(self.delay);
        self.inner.analyze(payload, parameters)
    }
}

/// Engine that always fails with the given message
pub struct FailingEngine(pub String);

impl AnalysisEngine for FailingEngine {
    fn analyze(
        &self,
        _payload: &AnalysisPayload,
        _parameters: &AnalysisParameters,
    ) -> Result<ResultsBundle, AnalysisError> {
        Err(AnalysisError::Computation(self.0.clone()))
    }
}

/// Engine whose bundle holds a NaN metric
pub struct NonFiniteEngine;

impl AnalysisEngine for NonFiniteEngine {
    fn analyze(
        &self,
        _payload: &AnalysisPayload,
        _parameters: &AnalysisParameters,
    ) -> Result<ResultsBundle, AnalysisError> {
        let mut results = ResultsBundle::default();
        results.metrics.insert("energy_contribution".to_string(), f64::NAN);
        Ok(results)
    }
}
