//! tpa-service library interface
//!
//! Transfer path analysis job pipeline: measurement file ingestion (CSV, XLSX,
//! MAT, HDF5), analysis job lifecycle with timeout supervision, and the HTTP
//! surface over both.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod formats;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tpa_common::events::EventBus;

use crate::config::ServiceSettings;
use crate::services::{AnalysisEngine, FileIngestService, JobManager, TpaEngine};

/// Room for multipart framing on top of the file bytes themselves
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub ingest: FileIngestService,
    pub jobs: JobManager,
    pub settings: Arc<ServiceSettings>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, settings: ServiceSettings) -> Self {
        let engine = Arc::new(TpaEngine::new(settings.analysis.defaults));
        Self::with_engine(db, event_bus, settings, engine)
    }

    /// State with a specific analysis engine
    pub fn with_engine(
        db: SqlitePool,
        event_bus: EventBus,
        settings: ServiceSettings,
        engine: Arc<dyn AnalysisEngine>,
    ) -> Self {
        let ingest = FileIngestService::new(
            db.clone(),
            event_bus.clone(),
            settings.upload_folder.clone(),
            settings.max_upload_bytes,
        );
        let jobs = JobManager::new(
            db.clone(),
            event_bus.clone(),
            engine,
            settings.analysis.clone(),
        );
        Self {
            db,
            event_bus,
            ingest,
            jobs,
            settings: Arc::new(settings),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let body_limit = state
        .settings
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let cors = cors_layer(&state.settings.cors_origins);

    let router = Router::new()
        .merge(api::health_routes())
        .merge(api::file_routes())
        .merge(api::analysis_routes())
        .merge(api::results_routes())
        .route("/events", get(api::event_stream))
        .layer(DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// CORS layer for the configured origins, `None` when there are none
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if allowed.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any),
    )
}
