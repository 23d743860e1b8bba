//! Measurement file metadata extraction
//!
//! Produces the structural summary stored with a file record:
//! - CSV / XLSX: columns, row count, data type, frequency range, channels
//! - MAT: variables, shapes, data type (classic reader, then v7.3 fallback)
//! - HDF5: every group and dataset, parent before children
//!
//! Blocking; callers on the async runtime use `spawn_blocking`.

use std::path::Path;

use crate::formats::hdf5::{EntryKind, Hdf5File};
use crate::formats::{matlab, tabular, FileKind, IngestError};
use crate::models::{DatasetInfo, FileMetadata, Hdf5Metadata};

/// Metadata extractor service
pub struct MetadataExtractor {}

impl MetadataExtractor {
    /// Create new metadata extractor
    pub fn new() -> Self {
        Self {}
    }

    /// Extract metadata from a file of a known kind
    pub fn extract(&self, path: &Path, kind: FileKind) -> Result<FileMetadata, IngestError> {
        let metadata = match kind {
            FileKind::Csv => FileMetadata::Tabular(tabular::summarize_csv(path)?),
            FileKind::Xlsx => FileMetadata::Tabular(tabular::summarize_xlsx(path)?),
            FileKind::Mat => FileMetadata::Matlab(matlab::summarize_matlab(path)?),
            FileKind::H5 => FileMetadata::Hdf5(summarize_hdf5(path)?),
        };

        tracing::debug!(
            file = %path.display(),
            kind = %kind,
            "Extracted metadata"
        );
        Ok(metadata)
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract metadata with a default extractor
pub fn extract_metadata(path: &Path, kind: FileKind) -> Result<FileMetadata, IngestError> {
    MetadataExtractor::new().extract(path, kind)
}

fn summarize_hdf5(path: &Path) -> Result<Hdf5Metadata, IngestError> {
    let file = Hdf5File::open(path).map_err(|e| IngestError::unreadable(path, e.to_string()))?;
    let entries = file
        .walk()
        .map_err(|e| IngestError::unreadable(path, e.to_string()))?;

    let mut metadata = Hdf5Metadata {
        groups: Vec::new(),
        datasets: Vec::new(),
    };
    for entry in entries {
        match entry.kind {
            EntryKind::Group => metadata.groups.push(entry.path),
            EntryKind::Dataset(dataset) => metadata.datasets.push(DatasetInfo {
                name: entry.path,
                shape: dataset.shape(),
                dtype: dataset.dtype_name(),
            }),
        }
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_nonexistent_file() {
        let extractor = MetadataExtractor::new();
        for kind in FileKind::ALL {
            let result = extractor.extract(Path::new("/nonexistent/file"), kind);
            assert!(
                matches!(result, Err(IngestError::UnreadableFile { .. })),
                "{kind} should be unreadable"
            );
        }
    }

    #[test]
    fn test_csv_dispatch() {
        let file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        std::fs::write(file.path(), "time,acc_fl\n0,1\n").unwrap();

        let metadata = extract_metadata(file.path(), FileKind::Csv).unwrap();
        let FileMetadata::Tabular(tabular) = metadata else {
            panic!("expected tabular metadata");
        };
        assert_eq!(tabular.rows, 1);
    }
}
