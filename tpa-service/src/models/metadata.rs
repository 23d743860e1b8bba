//! Extracted file metadata
//!
//! Structural summaries produced at upload time, one shape per reader family.
//! Persisted as JSON alongside the file record.

use serde::{Deserialize, Serialize};

use crate::formats::{ChannelType, DataType};
use crate::models::FrequencyRange;

/// Metadata for any supported file kind
///
/// Untagged so the stored JSON is the plain per-format mapping; the
/// variants have disjoint required fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileMetadata {
    Tabular(TabularMetadata),
    Matlab(MatlabMetadata),
    Hdf5(Hdf5Metadata),
}

/// CSV / spreadsheet summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularMetadata {
    /// Column names in file order
    pub columns: Vec<String>,
    /// Data rows (header excluded)
    pub rows: usize,
    /// Worksheet names (spreadsheets only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheets: Option<Vec<String>>,
    pub data_type: DataType,
    /// Min/max of the `frequency` column for frequency-domain tables
    pub frequency_range: Option<FrequencyRange>,
    /// Every column other than `time` / `frequency`
    pub channels: Vec<ChannelInfo>,
}

/// A measurement channel (table column)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
}

/// MAT-file summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatlabMetadata {
    /// Top-level variable names (reserved `__` names excluded)
    pub variables: Vec<String>,
    pub data_type: DataType,
    pub matrices: Vec<MatrixShape>,
}

/// Name and shape of an array variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixShape {
    pub name: String,
    pub shape: Vec<usize>,
}

/// Generic HDF5 container summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hdf5Metadata {
    /// Group paths, parent before children
    pub groups: Vec<String>,
    pub datasets: Vec<DatasetInfo>,
}

/// A dataset found while walking an HDF5 container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    /// Slash-separated path from the root (no leading slash)
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
}
