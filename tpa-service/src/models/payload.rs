//! Loaded analysis payload
//!
//! What the data loader hands to the analysis engine: operational tables,
//! FRF matrices and the measurement points derived from channel names.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::formats::ChannelType;

/// Payload accumulated across all input files of a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub reference_points: Vec<MeasurementPoint>,
    pub response_points: Vec<MeasurementPoint>,
    pub operational_data: Vec<OperationalData>,
    pub frf_matrices: Vec<FrfMatrix>,
}

impl AnalysisPayload {
    /// True when no slot holds anything
    pub fn is_empty(&self) -> bool {
        self.reference_points.is_empty()
            && self.response_points.is_empty()
            && self.operational_data.is_empty()
            && self.frf_matrices.is_empty()
    }

    /// Merge another payload into this one, preserving order
    pub fn extend(&mut self, other: AnalysisPayload) {
        self.reference_points.extend(other.reference_points);
        self.response_points.extend(other.response_points);
        self.operational_data.extend(other.operational_data);
        self.frf_matrices.extend(other.frf_matrices);
    }

    /// Numeric measurement channels across all operational tables, in file order
    ///
    /// `time` and `frequency` axes are skipped, as are columns without a
    /// single numeric value.
    pub fn measurement_channels(&self) -> impl Iterator<Item = &DataColumn> {
        self.operational_data
            .iter()
            .flat_map(|table| table.columns.iter())
            .filter(|column| !is_axis_column(&column.name))
            .filter(|column| column.numeric_values().next().is_some())
    }
}

/// `time` and `frequency` columns are axes, not channels
pub fn is_axis_column(name: &str) -> bool {
    name == "time" || name == "frequency"
}

/// A channel usable as reference or response point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPoint {
    pub file_id: Uuid,
    pub channel: String,
    pub channel_type: ChannelType,
}

/// A fully loaded operational table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalData {
    pub file_id: Uuid,
    pub columns: Vec<DataColumn>,
}

/// One table column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataColumn {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl DataColumn {
    pub fn numeric_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().filter_map(CellValue::as_f64)
    }
}

/// Table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Missing,
}

impl CellValue {
    /// Parse a raw text field: empty → missing, numeric → number, else text
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(value) => CellValue::Number(value),
            Err(_) => CellValue::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(value) if value.is_finite() => Some(*value),
            _ => None,
        }
    }
}

/// An array recorded as a frequency-response-function source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrfMatrix {
    pub file_id: Uuid,
    pub name: String,
    pub shape: Vec<usize>,
    pub matrix: MatrixPayload,
}

/// Matrix contents, or a marker standing in for them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatrixPayload {
    /// Row-major element values; `imag` present for complex arrays
    Values {
        real: Vec<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        imag: Option<Vec<f64>>,
    },
    /// Element count exceeded the materialization limit
    TooLarge { element_count: usize },
    /// Elements are not numbers (strings, references, ...)
    NonNumeric { dtype: String },
}

impl MatrixPayload {
    /// Build the payload for an array, or the size marker when `element_count > limit`
    ///
    /// `read` is only invoked below the limit.
    pub fn bounded<E>(
        element_count: usize,
        limit: usize,
        read: impl FnOnce() -> Result<MatrixPayload, E>,
    ) -> Result<MatrixPayload, E> {
        if element_count > limit {
            Ok(MatrixPayload::TooLarge { element_count })
        } else {
            read()
        }
    }

    pub fn is_too_large(&self) -> bool {
        matches!(self, MatrixPayload::TooLarge { .. })
    }
}
