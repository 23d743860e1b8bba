//! Channel and data-type vocabulary
//!
//! Name-based heuristics shared by the tabular and MATLAB readers and by the
//! data loader when it assigns reference/response points.

use serde::{Deserialize, Serialize};

/// Sensor type inferred from a channel (column) name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Accelerometer,
    Microphone,
    Force,
    Displacement,
    Velocity,
    Unknown,
}

impl ChannelType {
    /// Excitation-side channels (reference points)
    pub fn is_reference(&self) -> bool {
        matches!(self, ChannelType::Force)
    }

    /// Response-side channels (response points)
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            ChannelType::Accelerometer
                | ChannelType::Microphone
                | ChannelType::Displacement
                | ChannelType::Velocity
        )
    }
}

/// Ordered vocabulary; the first entry with a matching keyword wins
const CHANNEL_VOCABULARY: &[(&[&str], ChannelType)] = &[
    (&["acc", "accel", "acceleration"], ChannelType::Accelerometer),
    (&["mic", "microphone", "spl"], ChannelType::Microphone),
    (&["force", "load"], ChannelType::Force),
    (&["disp", "displacement"], ChannelType::Displacement),
    (&["vel", "velocity"], ChannelType::Velocity),
];

/// Classify a channel by case-insensitive substring match
pub fn classify_channel(name: &str) -> ChannelType {
    let lowered = name.to_lowercase();
    CHANNEL_VOCABULARY
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(_, channel_type)| *channel_type)
        .unwrap_or(ChannelType::Unknown)
}

/// Kind of measurement a file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    TimeDomain,
    FrequencyDomain,
    FrequencyResponseFunction,
    Unknown,
}

/// Classify a MATLAB variable name
///
/// `frf`/`h` → FRF, `time`/`t` → time domain, `freq`/`f` → frequency domain,
/// checked in that order. `None` when the name matches no rule.
pub fn classify_matlab_variable(name: &str) -> Option<DataType> {
    let lowered = name.to_lowercase();
    if lowered.contains("frf") || lowered == "h" {
        Some(DataType::FrequencyResponseFunction)
    } else if lowered.contains("time") || lowered == "t" {
        Some(DataType::TimeDomain)
    } else if lowered.contains("freq") || lowered == "f" {
        Some(DataType::FrequencyDomain)
    } else {
        None
    }
}
