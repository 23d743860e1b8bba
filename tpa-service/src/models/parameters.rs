//! Analysis job parameters
//!
//! Free-form configuration mapping submitted with a job. Known keys are typed;
//! anything else is preserved verbatim in `extra` so the stored parameters
//! round-trip unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed frequency interval in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    pub min: f64,
    pub max: f64,
}

impl FrequencyRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Parameters of one analysis job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParameters {
    /// Analysis band (default: configured range, 20-2000 Hz)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_range: Option<FrequencyRange>,

    /// Number of log-spaced frequency points (default: configured resolution)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_resolution: Option<usize>,

    /// Paths taking part in the analysis; empty means "use `paths`"
    #[serde(default)]
    pub selected_paths: Vec<String>,

    /// Fallback path filter when `selected_paths` is empty
    #[serde(default)]
    pub paths: Vec<String>,

    /// RMS comparison targets (first 4 used; empty means defaults)
    #[serde(default)]
    pub targets: Vec<String>,

    /// Performance indicators to report (empty means all)
    #[serde(default)]
    pub indicators: Vec<String>,

    /// Unrecognized keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnalysisParameters {
    /// Effective path filter: `selected_paths`, else `paths`, else none (all paths)
    pub fn path_filter(&self) -> &[String] {
        if self.selected_paths.is_empty() {
            &self.paths
        } else {
            &self.selected_paths
        }
    }
}
