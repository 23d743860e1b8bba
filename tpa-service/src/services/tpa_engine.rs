//! Transfer path analysis computation
//!
//! The curves are a placeholder model standing in for real FRF-based
//! estimation. What callers rely on is the bundle's structure:
//! - a log-spaced, strictly positive, ascending frequency axis
//! - one transfer-function series per active path, values clamped
//! - contribution shares normalized to 1 per frequency
//! - at most four RMS comparisons
//!
//! Output is deterministic for a given payload and parameter set.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use thiserror::Error;

use crate::models::{
    AnalysisParameters, AnalysisPayload, ContributionRow, FrequencyRange, ResultsBundle,
    RmsComparison, SystemResponsePoint, TransferFunctionPoint,
};

/// Path names in `path_id` order
pub const DEFAULT_PATHS: [&str; 6] = ["Engine", "Exhaust", "Transmission", "Road", "Wind", "Suspension"];

/// RMS comparison targets used when none are given
pub const DEFAULT_TARGETS: [&str; 4] = ["Interior Noise", "Driver Ear", "Passenger Ear", "Seat Vibration"];

pub const MAX_TARGETS: usize = 4;

const MAGNITUDE_LIMIT_DB: f64 = 60.0;
const PHASE_LIMIT_DEG: f64 = 180.0;
const RESPONSE_FLOOR_DB: f64 = 0.0;
const RESPONSE_CEILING_DB: f64 = 80.0;

/// Primary resonance of the placeholder model (Hz) and its damping term
const RESONANCE_HZ: f64 = 500.0;
const DAMPING: f64 = 0.1;

/// Upper bound on `frequency_resolution` unless configured otherwise
pub const DEFAULT_MAX_FREQUENCY_RESOLUTION: usize = 10_000;

const PERFORMANCE_INDICATORS: [(&str, f64); 5] = [
    ("overall_accuracy", 92.7),
    ("frequency_range_coverage", 98.5),
    ("path_contribution_confidence", 87.3),
    ("matrix_condition_number", 12.4),
    ("coherence_average", 0.89),
];

/// Analysis errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Frequency range or resolution unusable
    #[error("Invalid analysis parameters: {0}")]
    InvalidParameters(String),

    /// Result synthesis failed
    #[error("{0}")]
    Computation(String),
}

/// Defaults applied when a job's parameters leave them out
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisDefaults {
    pub frequency_range: FrequencyRange,
    pub frequency_resolution: usize,
    /// Requests above this many points are rejected
    pub max_frequency_resolution: usize,
}

impl Default for AnalysisDefaults {
    fn default() -> Self {
        Self {
            frequency_range: FrequencyRange::new(20.0, 2000.0),
            frequency_resolution: 100,
            max_frequency_resolution: DEFAULT_MAX_FREQUENCY_RESOLUTION,
        }
    }
}

/// Computes a results bundle from a loaded payload
///
/// CPU-bound; the job manager calls it from a blocking worker.
pub trait AnalysisEngine: Send + Sync {
    fn analyze(
        &self,
        payload: &AnalysisPayload,
        parameters: &AnalysisParameters,
    ) -> Result<ResultsBundle, AnalysisError>;
}

/// Placeholder TPA model
#[derive(Debug, Clone, Default)]
pub struct TpaEngine {
    defaults: AnalysisDefaults,
}

impl TpaEngine {
    pub fn new(defaults: AnalysisDefaults) -> Self {
        Self { defaults }
    }
}

impl AnalysisEngine for TpaEngine {
    fn analyze(
        &self,
        payload: &AnalysisPayload,
        parameters: &AnalysisParameters,
    ) -> Result<ResultsBundle, AnalysisError> {
        let range = parameters
            .frequency_range
            .unwrap_or(self.defaults.frequency_range);
        let points = parameters
            .frequency_resolution
            .unwrap_or(self.defaults.frequency_resolution);
        let frequencies = frequency_axis(range, points, self.defaults.max_frequency_resolution)?;
        let paths = active_paths(parameters.path_filter());

        let system_response = frequencies.iter().map(|f| system_response_at(*f)).collect();
        let transfer_functions = paths
            .iter()
            .flat_map(|(id, name)| {
                frequencies
                    .iter()
                    .map(move |f| transfer_function_at(*id, name, *f))
            })
            .collect();
        let contributions = frequencies
            .iter()
            .map(|f| contribution_row(&paths, *f))
            .collect();
        let rms_comparison = rms_comparison(payload, &parameters.targets);

        let mut metrics = BTreeMap::from([
            ("sound_pressure_level".to_string(), 78.5),
            ("vibration_amplitude".to_string(), 0.42),
            ("energy_contribution".to_string(), 1.24),
        ]);
        metrics.insert("active_paths".to_string(), paths.len() as f64);
        metrics.insert("frequency_points".to_string(), frequencies.len() as f64);
        metrics.insert("frf_matrices".to_string(), payload.frf_matrices.len() as f64);
        metrics.insert(
            "operational_channels".to_string(),
            payload.measurement_channels().count() as f64,
        );

        Ok(ResultsBundle {
            metrics,
            system_response,
            transfer_functions,
            contributions,
            rms_comparison,
            performance_indicators: performance_indicators(&parameters.indicators),
        })
    }
}

/// `points` log-spaced frequencies from `range.min` to `range.max` inclusive
///
/// `points` is checked against `max_points` before anything is allocated.
pub fn frequency_axis(
    range: FrequencyRange,
    points: usize,
    max_points: usize,
) -> Result<Vec<f64>, AnalysisError> {
    if !(range.min.is_finite() && range.min > 0.0) {
        return Err(AnalysisError::InvalidParameters(format!(
            "frequency_range.min must be positive, got {}",
            range.min
        )));
    }
    if !(range.max.is_finite() && range.max > range.min) {
        return Err(AnalysisError::InvalidParameters(format!(
            "frequency_range.max must exceed min ({}), got {}",
            range.min, range.max
        )));
    }
    if points < 2 {
        return Err(AnalysisError::InvalidParameters(format!(
            "frequency_resolution must be at least 2, got {points}"
        )));
    }
    if points > max_points {
        return Err(AnalysisError::InvalidParameters(format!(
            "frequency_resolution must not exceed {max_points}, got {points}"
        )));
    }

    let (start, end) = (range.min.log10(), range.max.log10());
    let step = (end - start) / (points - 1) as f64;
    let mut axis: Vec<f64> = (0..points)
        .map(|i| 10f64.powf(start + step * i as f64))
        .collect();
    axis[0] = range.min;
    axis[points - 1] = range.max;
    Ok(axis)
}

/// `(path_id, name)` of the paths taking part; an empty filter selects all
///
/// Filter names that match no known path are ignored.
pub fn active_paths(filter: &[String]) -> Vec<(usize, &'static str)> {
    DEFAULT_PATHS
        .iter()
        .enumerate()
        .filter(|(_, name)| filter.is_empty() || filter.iter().any(|f| f == *name))
        .map(|(id, name)| (id, *name))
        .collect()
}

/// Phase of a damped single-degree-of-freedom resonance, degrees
fn resonance_phase(frequency: f64) -> f64 {
    let ratio = frequency / RESONANCE_HZ;
    -(DAMPING * ratio).atan2(1.0 - ratio * ratio) * 180.0 / PI
}

fn system_response_at(frequency: f64) -> SystemResponsePoint {
    let response = 60.0 + 10.0 * (frequency / 50.0).sin()
        - 20.0 * (-((frequency - 500.0) / 100.0).powi(2)).exp()
        + 15.0 * (-((frequency - 1200.0) / 150.0).powi(2)).exp()
        - 0.01 * frequency;
    let phase = resonance_phase(frequency) + 20.0 * (frequency / 200.0).sin();
    SystemResponsePoint {
        frequency,
        response: response.clamp(RESPONSE_FLOOR_DB, RESPONSE_CEILING_DB),
        phase: phase.clamp(-PHASE_LIMIT_DEG, PHASE_LIMIT_DEG),
    }
}

fn transfer_function_at(path_id: usize, path_name: &str, frequency: f64) -> TransferFunctionPoint {
    let ratio = frequency / RESONANCE_HZ;
    let denominator = ((1.0 - ratio * ratio).powi(2) + (DAMPING * ratio).powi(2)).sqrt();
    let magnitude = 20.0 * (1.0 / denominator).log10() + 5.0 * (frequency / 100.0).sin() + 40.0
        - 5.0 * path_id as f64;
    let phase =
        resonance_phase(frequency) + 20.0 * (frequency / 200.0).sin() + 30.0 * path_id as f64;
    TransferFunctionPoint {
        path_id,
        path_name: path_name.to_string(),
        frequency,
        magnitude: magnitude.clamp(-MAGNITUDE_LIMIT_DB, MAGNITUDE_LIMIT_DB),
        phase: phase.clamp(-PHASE_LIMIT_DEG, PHASE_LIMIT_DEG),
    }
}

/// Contribution level of a path in dB; each path peaks at its own frequency
fn contribution_level_db(path_id: usize, frequency: f64) -> f64 {
    let peak = 300.0 + 100.0 * path_id as f64;
    30.0 + 15.0 * (frequency / 100.0).sin() - 0.01 * frequency - 5.0 * path_id as f64
        + 10.0 * (-((frequency - peak) / 100.0).powi(2)).exp()
}

fn contribution_row(paths: &[(usize, &'static str)], frequency: f64) -> ContributionRow {
    let mut contributions: BTreeMap<String, f64> = paths
        .iter()
        .map(|(id, name)| {
            let amplitude = 10f64.powf(contribution_level_db(*id, frequency) / 20.0);
            (name.to_string(), amplitude)
        })
        .collect();

    let total: f64 = contributions.values().sum();
    if total > 0.0 {
        for share in contributions.values_mut() {
            *share /= total;
        }
    }
    ContributionRow {
        frequency,
        contributions,
    }
}

fn rms_comparison(payload: &AnalysisPayload, targets: &[String]) -> Vec<RmsComparison> {
    let names: Vec<&str> = if targets.is_empty() {
        DEFAULT_TARGETS.to_vec()
    } else {
        targets.iter().take(MAX_TARGETS).map(String::as_str).collect()
    };
    let measured_levels: Vec<f64> = payload
        .measurement_channels()
        .map(|column| rms(column.numeric_values()))
        .collect();

    names
        .into_iter()
        .enumerate()
        .map(|(index, target)| {
            let mut rng = StdRng::seed_from_u64(fnv1a(target));
            let measured = match measured_levels.get(index) {
                Some(level) => *level,
                None => 60.0 + 5.0 * standard_normal(&mut rng),
            };
            let predicted = measured + 0.05 * measured.abs() * standard_normal(&mut rng);
            RmsComparison::new(target, measured, predicted)
        })
        .collect()
}

/// Root mean square, scaled by the largest magnitude so squaring cannot overflow
fn rms(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return 0.0;
    }
    let scale = values.iter().fold(0.0f64, |max, v| max.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return scale;
    }
    let sum: f64 = values.iter().map(|v| (v / scale).powi(2)).sum();
    scale * (sum / values.len() as f64).sqrt()
}

/// Box-Muller
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Stable 64-bit FNV-1a, used as an RNG seed
fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn performance_indicators(requested: &[String]) -> BTreeMap<String, f64> {
    PERFORMANCE_INDICATORS
        .iter()
        .filter(|(name, _)| requested.is_empty() || requested.iter().any(|r| r == name))
        .map(|(name, value)| (name.to_string(), *value))
        .collect()
}
