//! Services for tpa-service
//!
//! - metadata extraction and payload loading over the `formats` readers
//! - upload ingestion
//! - the analysis engine
//! - job lifecycle management and its timeout supervisor

pub mod data_loader;
pub mod file_ingest;
pub mod job_manager;
pub mod metadata_extractor;
pub mod timeout_supervisor;
pub mod tpa_engine;

pub use data_loader::{load_payload, DataLoader};
pub use file_ingest::{FileIngestService, UploadError};
pub use job_manager::{JobError, JobManager, Submission};
pub use metadata_extractor::{extract_metadata, MetadataExtractor};
pub use timeout_supervisor::supervise_timeout;
pub use tpa_engine::{AnalysisDefaults, AnalysisEngine, AnalysisError, TpaEngine};
