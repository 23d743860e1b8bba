//! Analysis results bundle
//!
//! Written exactly once per successful job and read back by the results API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything a completed job produces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsBundle {
    pub metrics: BTreeMap<String, f64>,
    /// Frequency-ascending
    pub system_response: Vec<SystemResponsePoint>,
    /// Grouped by path, each group frequency-ascending
    pub transfer_functions: Vec<TransferFunctionPoint>,
    /// One row per frequency bin
    pub contributions: Vec<ContributionRow>,
    /// At most four targets
    pub rms_comparison: Vec<RmsComparison>,
    pub performance_indicators: BTreeMap<String, f64>,
}

impl ResultsBundle {
    /// Name of the first section holding a NaN or infinite value
    ///
    /// JSON has no encoding for those, so such a bundle cannot be stored.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        if !all_finite(self.metrics.values().copied()) {
            return Some("metrics");
        }
        if !all_finite(
            self.system_response
                .iter()
                .flat_map(|p| [p.frequency, p.response, p.phase]),
        ) {
            return Some("system_response");
        }
        if !all_finite(
            self.transfer_functions
                .iter()
                .flat_map(|p| [p.frequency, p.magnitude, p.phase]),
        ) {
            return Some("transfer_functions");
        }
        if !all_finite(self.contributions.iter().flat_map(|row| {
            std::iter::once(row.frequency).chain(row.contributions.values().copied())
        })) {
            return Some("contributions");
        }
        if !all_finite(self.rms_comparison.iter().flat_map(|row| {
            [row.measured_rms, row.predicted_rms, row.absolute_error]
                .into_iter()
                .chain(row.relative_error)
        })) {
            return Some("rms_comparison");
        }
        if !all_finite(self.performance_indicators.values().copied()) {
            return Some("performance_indicators");
        }
        None
    }
}

fn all_finite(values: impl IntoIterator<Item = f64>) -> bool {
    values.into_iter().all(f64::is_finite)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemResponsePoint {
    pub frequency: f64,
    /// dB
    pub response: f64,
    /// Degrees
    pub phase: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferFunctionPoint {
    pub path_id: usize,
    pub path_name: String,
    pub frequency: f64,
    /// dB
    pub magnitude: f64,
    /// Degrees
    pub phase: f64,
}

/// Normalized path shares at one frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionRow {
    pub frequency: f64,
    pub contributions: BTreeMap<String, f64>,
}

impl ContributionRow {
    pub fn total(&self) -> f64 {
        self.contributions.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmsComparison {
    pub target_name: String,
    pub measured_rms: f64,
    pub predicted_rms: f64,
    pub absolute_error: f64,
    /// Percent of the measured value; `None` when the measured RMS is zero
    pub relative_error: Option<f64>,
}

impl RmsComparison {
    pub fn new(target_name: impl Into<String>, measured_rms: f64, predicted_rms: f64) -> Self {
        let absolute_error = (measured_rms - predicted_rms).abs();
        let relative_error = if measured_rms == 0.0 {
            None
        } else {
            Some(absolute_error / measured_rms * 100.0)
        };
        Self {
            target_name: target_name.into(),
            measured_rms,
            predicted_rms,
            absolute_error,
            relative_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_errors() {
        let row = RmsComparison::new("Driver Ear", 50.0, 52.5);
        assert!((row.absolute_error - 2.5).abs() < 1e-12);
        assert!((row.relative_error.unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_values_are_located() {
        let mut bundle = ResultsBundle {
            rms_comparison: vec![RmsComparison::new("Driver Ear", 1e200, 1.5e200)],
            ..Default::default()
        };
        assert_eq!(bundle.first_non_finite(), None);

        bundle.rms_comparison.push(RmsComparison::new("Seat Vibration", f64::INFINITY, 1.0));
        assert_eq!(bundle.first_non_finite(), Some("rms_comparison"));

        bundle.metrics.insert("energy_contribution".to_string(), f64::NAN);
        assert_eq!(bundle.first_non_finite(), Some("metrics"));
    }

    #[test]
    fn test_zero_measured_rms_has_no_relative_error() {
        let row = RmsComparison::new("Seat Vibration", 0.0, 1.0);
        assert_eq!(row.absolute_error, 1.0);
        assert_eq!(row.relative_error, None);
        let json = serde_json::to_value(&row).unwrap();
        assert!(json["relative_error"].is_null());
    }
}
