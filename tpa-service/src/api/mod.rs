//! HTTP API handlers for tpa-service
//!
//! - `/api/files`: upload, list, get, delete measurement files
//! - `/api/analysis`: submit, list, get, delete analysis jobs
//! - `/api/results`: read-only views of a completed job's results bundle
//! - `/health`, `/`, `/events`

pub mod analysis;
pub mod files;
pub mod health;
pub mod results;
pub mod sse;

use serde::Deserialize;

pub use analysis::analysis_routes;
pub use files::file_routes;
pub use health::health_routes;
pub use results::results_routes;
pub use sse::event_stream;

/// `?skip=&limit=` query for list endpoints
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}
