//! Measurement file formats
//!
//! Format detection by extension plus per-format readers:
//! - `tabular`: CSV and XLSX tables
//! - `matlab`: MAT-files (classic v5, falling back to the HDF5-based v7.3 container)
//! - `hdf5`: pure-Rust reader for generic HDF5 containers

pub mod channels;
pub mod hdf5;
pub mod matlab;
pub mod tabular;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub use channels::{classify_channel, ChannelType, DataType};

/// Supported measurement file kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    Xlsx,
    Mat,
    H5,
}

impl FileKind {
    pub const ALL: [FileKind; 4] = [FileKind::Csv, FileKind::Xlsx, FileKind::Mat, FileKind::H5];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Xlsx => "xlsx",
            FileKind::Mat => "mat",
            FileKind::H5 => "h5",
        }
    }

    /// Extension including the leading dot, as shown to uploaders
    pub fn dotted_extension(&self) -> String {
        format!(".{}", self.as_str())
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim_start_matches('.').to_ascii_lowercase();
        FileKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| IngestError::UnsupportedFormat(s.to_string()))
    }
}

/// Classify a file by the lowercased extension of its name
///
/// No content inspection. `None` means unsupported.
pub fn detect_format(filename: &str) -> Option<FileKind> {
    let extension = Path::new(filename).extension()?.to_str()?;
    extension.parse().ok()
}

/// Comma-separated list of accepted extensions for error messages
pub fn supported_extensions() -> String {
    FileKind::ALL
        .iter()
        .map(FileKind::dotted_extension)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestError {
    /// File extension not recognized
    #[error("Invalid file type. Supported types: {}", supported_extensions())]
    UnsupportedFormat(String),

    /// Recognized format, but no strategy could parse the content
    #[error("Error processing file {}: {reason}", path.display())]
    UnreadableFile { path: PathBuf, reason: String },

    /// None of a job's input files yielded a usable payload
    #[error("No usable data could be loaded from the selected files")]
    NoUsableData,

    /// I/O error (file open/read)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn unreadable(path: &Path, reason: impl Into<String>) -> Self {
        IngestError::UnreadableFile {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}
