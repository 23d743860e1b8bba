//! MAT-files
//!
//! Readers are tried as an ordered list of strategies, stopping at the first
//! success: classic MAT v5 (`matfile`), then the HDF5 container used by
//! MATLAB v7.3. When every strategy fails the error names each attempt.

use matfile::{MatFile, NumericData};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

use crate::formats::channels::classify_matlab_variable;
use crate::formats::hdf5::{DatasetValues, EntryKind, Hdf5Error, Hdf5File};
use crate::formats::{DataType, IngestError};
use crate::models::{MatlabMetadata, MatrixPayload, MatrixShape};

/// A way of reading a MAT-file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatlabStrategy {
    /// Level 5 MAT-file (v5 through v7)
    Classic,
    /// HDF5-based v7.3 container
    Hierarchical,
}

impl MatlabStrategy {
    /// Attempt order
    pub const ORDER: [MatlabStrategy; 2] = [MatlabStrategy::Classic, MatlabStrategy::Hierarchical];

    pub fn name(&self) -> &'static str {
        match self {
            MatlabStrategy::Classic => "classic",
            MatlabStrategy::Hierarchical => "hdf5",
        }
    }
}

/// A top-level array, ready to become an FRF matrix entry
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArray {
    pub name: String,
    pub shape: Vec<usize>,
    pub matrix: MatrixPayload,
}

/// Variables internal to the container format
///
/// `__header__`-style names, plus the `#refs#` / `#subsystem#` groups of v7.3 files.
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with("__") || (name.len() > 1 && name.starts_with('#') && name.ends_with('#'))
}

/// Summarize a MAT-file's variables
pub fn summarize_matlab(path: &Path) -> Result<MatlabMetadata, IngestError> {
    run_strategies(path, |strategy| match strategy {
        MatlabStrategy::Classic => classic_metadata(path),
        MatlabStrategy::Hierarchical => hierarchical_metadata(path),
    })
}

/// Load every top-level numeric array of a MAT-file
///
/// Arrays with more than `element_limit` elements are replaced by a size marker.
pub fn read_matlab_arrays(
    path: &Path,
    element_limit: usize,
) -> Result<Vec<NamedArray>, IngestError> {
    run_strategies(path, |strategy| match strategy {
        MatlabStrategy::Classic => classic_arrays(path, element_limit),
        MatlabStrategy::Hierarchical => {
            read_hdf5_arrays(path, element_limit).map_err(|e| e.to_string())
        }
    })
}

fn run_strategies<T>(
    path: &Path,
    attempt: impl Fn(MatlabStrategy) -> Result<T, String>,
) -> Result<T, IngestError> {
    let mut failures = Vec::with_capacity(MatlabStrategy::ORDER.len());
    for strategy in MatlabStrategy::ORDER {
        match attempt(strategy) {
            Ok(value) => return Ok(value),
            Err(reason) => {
                debug!(
                    path = %path.display(),
                    strategy = strategy.name(),
                    reason = %reason,
                    "MAT-file strategy failed"
                );
                failures.push(format!("{}: {}", strategy.name(), reason));
            }
        }
    }
    Err(IngestError::unreadable(
        path,
        format!("Unable to read MATLAB file format: {}", failures.join("; ")),
    ))
}

/// Top-level datasets of an HDF5 file (MAT v7.3 or plain HDF5)
pub fn read_hdf5_arrays(
    path: &Path,
    element_limit: usize,
) -> Result<Vec<NamedArray>, Hdf5Error> {
    let file = Hdf5File::open(path)?;
    let mut arrays = Vec::new();
    for entry in file.root_entries()? {
        let EntryKind::Dataset(dataset) = entry.kind else {
            continue;
        };
        if is_reserved_name(&entry.path) {
            continue;
        }
        let matrix = MatrixPayload::bounded(dataset.element_count(), element_limit, || {
            Ok::<_, Hdf5Error>(match file.read_values(&dataset)? {
                DatasetValues::Real(real) => MatrixPayload::Values { real, imag: None },
                DatasetValues::Complex { real, imag } => MatrixPayload::Values {
                    real,
                    imag: Some(imag),
                },
                DatasetValues::NonNumeric => MatrixPayload::NonNumeric {
                    dtype: dataset.dtype_name(),
                },
            })
        })?;
        arrays.push(NamedArray {
            name: entry.path,
            shape: dataset.shape(),
            matrix,
        });
    }
    Ok(arrays)
}

fn classic_metadata(path: &Path) -> Result<MatlabMetadata, String> {
    let mat = parse_classic(path)?;
    let mut variables = Vec::new();
    let mut matrices = Vec::new();
    let mut data_type = DataType::Unknown;

    for array in mat.arrays().iter().filter(|a| !is_reserved_name(a.name())) {
        variables.push(array.name().to_string());
        matrices.push(MatrixShape {
            name: array.name().to_string(),
            shape: array.size().clone(),
        });
        // later variables override earlier ones
        if let Some(kind) = classify_matlab_variable(array.name()) {
            data_type = kind;
        }
    }

    Ok(MatlabMetadata {
        variables,
        data_type,
        matrices,
    })
}

fn hierarchical_metadata(path: &Path) -> Result<MatlabMetadata, String> {
    let file = Hdf5File::open(path).map_err(|e| e.to_string())?;
    let mut variables = Vec::new();
    let mut matrices = Vec::new();

    for entry in file.root_entries().map_err(|e| e.to_string())? {
        if is_reserved_name(&entry.path) {
            continue;
        }
        if let EntryKind::Dataset(dataset) = &entry.kind {
            matrices.push(MatrixShape {
                name: entry.path.clone(),
                shape: dataset.shape(),
            });
        }
        variables.push(entry.path);
    }

    Ok(MatlabMetadata {
        variables,
        data_type: DataType::Unknown,
        matrices,
    })
}

fn classic_arrays(path: &Path, element_limit: usize) -> Result<Vec<NamedArray>, String> {
    let mat = parse_classic(path)?;
    mat.arrays()
        .iter()
        .filter(|a| !is_reserved_name(a.name()))
        .map(|array| {
            let shape = array.size().clone();
            let count = shape.iter().product();
            let matrix = MatrixPayload::bounded(count, element_limit, || {
                let (real, imag) = widen(array.data());
                Ok::<_, String>(MatrixPayload::Values {
                    real: column_to_row_major(&real, &shape),
                    imag: imag.map(|imag| column_to_row_major(&imag, &shape)),
                })
            })?;
            Ok(NamedArray {
                name: array.name().to_string(),
                shape,
                matrix,
            })
        })
        .collect()
}

const MAT_HEADER_LEN: usize = 128;

/// Parse a level 5 MAT-file, refusing v7.3 containers up front
fn parse_classic(path: &Path) -> Result<MatFile, String> {
    let mut file = File::open(path).map_err(|e| e.to_string())?;
    let mut head = [0u8; MAT_HEADER_LEN];
    let read = read_prefix(&mut file, &mut head).map_err(|e| e.to_string())?;
    if read < MAT_HEADER_LEN {
        return Err("file too short for a MAT-file header".to_string());
    }

    let version = match &head[126..128] {
        b"IM" => u16::from_le_bytes([head[124], head[125]]),
        b"MI" => u16::from_be_bytes([head[124], head[125]]),
        _ => return Err("missing MAT-file endian indicator".to_string()),
    };
    if version == 0x0200 {
        return Err("MATLAB v7.3 (HDF5) container".to_string());
    }

    let file = File::open(path).map_err(|e| e.to_string())?;
    MatFile::parse(BufReader::new(file)).map_err(|e| format!("{e:?}"))
}

fn read_prefix(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn widen(data: &NumericData) -> (Vec<f64>, Option<Vec<f64>>) {
    fn lossless<T: Copy + Into<f64>>(values: &[T]) -> Vec<f64> {
        values.iter().map(|v| (*v).into()).collect()
    }
    match data {
        NumericData::Int8 { real, imag } => (lossless(real), imag.as_deref().map(lossless)),
        NumericData::UInt8 { real, imag } => (lossless(real), imag.as_deref().map(lossless)),
        NumericData::Int16 { real, imag } => (lossless(real), imag.as_deref().map(lossless)),
        NumericData::UInt16 { real, imag } => (lossless(real), imag.as_deref().map(lossless)),
        NumericData::Int32 { real, imag } => (lossless(real), imag.as_deref().map(lossless)),
        NumericData::UInt32 { real, imag } => (lossless(real), imag.as_deref().map(lossless)),
        NumericData::Single { real, imag } => (lossless(real), imag.as_deref().map(lossless)),
        NumericData::Double { real, imag } => (real.clone(), imag.clone()),
        NumericData::Int64 { real, imag } => {
            let cast = |values: &[i64]| values.iter().map(|v| *v as f64).collect::<Vec<_>>();
            (cast(real), imag.as_deref().map(cast))
        }
        NumericData::UInt64 { real, imag } => {
            let cast = |values: &[u64]| values.iter().map(|v| *v as f64).collect::<Vec<_>>();
            (cast(real), imag.as_deref().map(cast))
        }
    }
}

/// MAT-files store arrays column-major; payloads are row-major
pub fn column_to_row_major(values: &[f64], shape: &[usize]) -> Vec<f64> {
    let count: usize = shape.iter().product();
    if shape.len() < 2 || count != values.len() {
        return values.to_vec();
    }

    let mut out = Vec::with_capacity(count);
    let mut index = vec![0usize; shape.len()];
    for _ in 0..count {
        // column-major offset of the current row-major index
        let offset = index
            .iter()
            .zip(shape)
            .rev()
            .fold(0, |acc, (i, dim)| acc * dim + i);
        out.push(values[offset]);

        for axis in (0..shape.len()).rev() {
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    out
}
