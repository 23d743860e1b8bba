//! Analysis payload loading
//!
//! Reads the numeric contents of a job's input files:
//! - CSV / XLSX → operational data; channel names give reference
//!   (force) and response (acceleration, sound, displacement, velocity) points
//! - MAT / HDF5 → one FRF matrix entry per top-level array
//!
//! A file that fails to load is logged and skipped. Only an empty aggregate
//! payload is an error.

use tracing::{debug, warn};

use crate::formats::{classify_channel, detect_format, matlab, tabular, FileKind, IngestError};
use crate::models::{
    is_axis_column, AnalysisPayload, DataColumn, FileRecord, FrfMatrix, MeasurementPoint,
    OperationalData,
};

/// Arrays above this element count are not materialized
pub const DEFAULT_MATRIX_ELEMENT_LIMIT: usize = 10_000;

/// Data loader service
pub struct DataLoader {
    matrix_element_limit: usize,
}

impl DataLoader {
    pub fn new(matrix_element_limit: usize) -> Self {
        Self {
            matrix_element_limit,
        }
    }

    /// Load all files into one payload, in input order
    pub fn load(&self, files: &[FileRecord]) -> Result<AnalysisPayload, IngestError> {
        let mut payload = AnalysisPayload::default();
        for file in files {
            match self.load_file(file) {
                Ok(part) => {
                    debug!(
                        file_id = %file.id,
                        operational = part.operational_data.len(),
                        frf_matrices = part.frf_matrices.len(),
                        "Loaded file payload"
                    );
                    payload.extend(part);
                }
                Err(e) => {
                    warn!(
                        file_id = %file.id,
                        filename = %file.filename,
                        error = %e,
                        "Skipping file that could not be loaded"
                    );
                }
            }
        }

        if payload.is_empty() {
            return Err(IngestError::NoUsableData);
        }
        Ok(payload)
    }

    /// Payload contributed by a single file
    pub fn load_file(&self, file: &FileRecord) -> Result<AnalysisPayload, IngestError> {
        let kind = detect_format(&file.filename)
            .ok_or_else(|| IngestError::UnsupportedFormat(file.filename.clone()))?;
        let path = file.filepath.as_path();

        match kind {
            FileKind::Csv => Ok(operational_payload(file, tabular::read_csv_table(path)?)),
            FileKind::Xlsx => Ok(operational_payload(file, tabular::read_xlsx_table(path)?)),
            FileKind::Mat => {
                let arrays = matlab::read_matlab_arrays(path, self.matrix_element_limit)?;
                Ok(frf_payload(file, arrays))
            }
            FileKind::H5 => {
                let arrays = matlab::read_hdf5_arrays(path, self.matrix_element_limit)
                    .map_err(|e| IngestError::unreadable(path, e.to_string()))?;
                Ok(frf_payload(file, arrays))
            }
        }
    }
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new(DEFAULT_MATRIX_ELEMENT_LIMIT)
    }
}

/// Load a job's payload with the given matrix limit
pub fn load_payload(
    files: &[FileRecord],
    matrix_element_limit: usize,
) -> Result<AnalysisPayload, IngestError> {
    DataLoader::new(matrix_element_limit).load(files)
}

fn operational_payload(file: &FileRecord, columns: Vec<DataColumn>) -> AnalysisPayload {
    let mut payload = AnalysisPayload::default();
    for column in columns.iter().filter(|c| !is_axis_column(&c.name)) {
        let channel_type = classify_channel(&column.name);
        let point = MeasurementPoint {
            file_id: file.id,
            channel: column.name.clone(),
            channel_type,
        };
        if channel_type.is_reference() {
            payload.reference_points.push(point);
        } else if channel_type.is_response() {
            payload.response_points.push(point);
        }
    }
    payload.operational_data.push(OperationalData {
        file_id: file.id,
        columns,
    });
    payload
}

fn frf_payload(file: &FileRecord, arrays: Vec<matlab::NamedArray>) -> AnalysisPayload {
    AnalysisPayload {
        frf_matrices: arrays
            .into_iter()
            .map(|array| FrfMatrix {
                file_id: file.id,
                name: array.name,
                shape: array.shape,
                matrix: array.matrix,
            })
            .collect(),
        ..Default::default()
    }
}
