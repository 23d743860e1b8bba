//! Data models for tpa-service
//!
//! - file records and their extracted metadata
//! - analysis jobs, parameters and result bundles
//! - the in-memory payload passed from the data loader to the engine

pub mod analysis_job;
pub mod file_record;
pub mod metadata;
pub mod parameters;
pub mod payload;
pub mod results;

pub use analysis_job::AnalysisJob;
pub use file_record::FileRecord;
pub use metadata::{
    ChannelInfo, DatasetInfo, FileMetadata, Hdf5Metadata, MatlabMetadata, MatrixShape,
    TabularMetadata,
};
pub use parameters::{AnalysisParameters, FrequencyRange};
pub use payload::{
    is_axis_column, AnalysisPayload, CellValue, DataColumn, FrfMatrix, MatrixPayload,
    MeasurementPoint, OperationalData,
};
pub use results::{
    ContributionRow, ResultsBundle, RmsComparison, SystemResponsePoint, TransferFunctionPoint,
};
