//! Pure-Rust HDF5 reader
//!
//! Read-only access to the parts of the format that measurement files use:
//! - superblock versions 0-3, user blocks (MATLAB v7.3 files)
//! - object header versions 1 and 2 with continuation blocks
//! - old-style (symbol table) groups and compact new-style (link message) groups
//! - compact, contiguous and chunked (v1 B-tree) datasets with deflate,
//!   shuffle and fletcher32 filters
//!
//! Dense link storage (fractal heaps) is recognized but not traversed.

mod cursor;
mod header;
mod messages;
mod object;
mod storage;

pub use messages::Datatype;
pub use object::DatasetHeader;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use header::{Source, Superblock};
use object::{read_object, GroupStorage, ObjectKind};

/// HDF5 read errors
#[derive(Debug, Error)]
pub enum Hdf5Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not an HDF5 file (signature not found)")]
    NotHdf5,

    #[error("truncated HDF5 structure: {0}")]
    Truncated(&'static str),

    #[error("corrupt HDF5 structure: {0}")]
    Corrupt(String),

    #[error("unsupported HDF5 feature: {0}")]
    Unsupported(String),

    #[error("decompression failed: {0}")]
    Decompress(String),
}

/// A node found while walking the file
#[derive(Debug, Clone)]
pub struct Entry {
    /// Slash-separated path from the root, no leading slash
    pub path: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone)]
pub enum EntryKind {
    Group,
    Dataset(DatasetHeader),
}

/// Numeric contents of a dataset
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetValues {
    Real(Vec<f64>),
    Complex { real: Vec<f64>, imag: Vec<f64> },
    NonNumeric,
}

/// An open HDF5 file
pub struct Hdf5File {
    source: Source,
    superblock: Superblock,
}

impl Hdf5File {
    pub fn open(path: &Path) -> Result<Self, Hdf5Error> {
        let (source, superblock) = Source::open(path)?;
        Ok(Self { source, superblock })
    }

    /// Direct members of the root group, sorted by name
    pub fn root_entries(&self) -> Result<Vec<Entry>, Hdf5Error> {
        let root = self.superblock.root_object_header;
        let children = self.group_children(root)?;
        let mut entries = Vec::with_capacity(children.len());
        for (name, address) in children {
            if let Some(kind) = self.entry_kind(address)? {
                entries.push(Entry { path: name, kind });
            }
        }
        Ok(entries)
    }

    /// Every group and dataset, parent before children, siblings by name
    ///
    /// Depth-first over an explicit stack; a group reachable through several
    /// hard links is expanded only once.
    pub fn walk(&self) -> Result<Vec<Entry>, Hdf5Error> {
        let root = self.superblock.root_object_header;
        let mut expanded = HashSet::from([root]);
        let mut stack: Vec<(String, u64)> = self
            .group_children(root)?
            .into_iter()
            .rev()
            .collect();
        let mut entries = Vec::new();

        while let Some((path, address)) = stack.pop() {
            let Some(kind) = self.entry_kind(address)? else {
                continue;
            };
            let is_group = matches!(kind, EntryKind::Group);
            entries.push(Entry {
                path: path.clone(),
                kind,
            });

            if is_group && expanded.insert(address) {
                let children = self.group_children(address)?;
                stack.extend(
                    children
                        .into_iter()
                        .rev()
                        .map(|(name, child)| (format!("{path}/{name}"), child)),
                );
            }
        }
        Ok(entries)
    }

    /// Read a dataset's elements as numbers
    pub fn read_values(&self, dataset: &DatasetHeader) -> Result<DatasetValues, Hdf5Error> {
        let numeric = storage::is_numeric(&dataset.datatype);
        let complex = dataset.datatype.complex_parts().is_some();
        if !numeric && !complex {
            return Ok(DatasetValues::NonNumeric);
        }

        let raw = storage::read_raw(&self.source, &self.superblock, dataset)?;
        if complex {
            return Ok(storage::decode_complex(&raw, &dataset.datatype)
                .map(|(real, imag)| DatasetValues::Complex { real, imag })
                .unwrap_or(DatasetValues::NonNumeric));
        }
        Ok(storage::decode_numeric(&raw, &dataset.datatype)
            .map(DatasetValues::Real)
            .unwrap_or(DatasetValues::NonNumeric))
    }

    fn entry_kind(&self, address: u64) -> Result<Option<EntryKind>, Hdf5Error> {
        Ok(
            match read_object(&self.source, &self.superblock, address)? {
                ObjectKind::Group(_) => Some(EntryKind::Group),
                ObjectKind::Dataset(header) => Some(EntryKind::Dataset(header)),
                ObjectKind::Other => None,
            },
        )
    }

    /// Hard-linked members of a group, sorted by name
    fn group_children(&self, address: u64) -> Result<Vec<(String, u64)>, Hdf5Error> {
        let group = match read_object(&self.source, &self.superblock, address)? {
            ObjectKind::Group(group) => group,
            _ => return Err(Hdf5Error::Corrupt("expected a group".to_string())),
        };

        let children: BTreeMap<String, u64> = match group {
            GroupStorage::SymbolTable(table) => {
                storage::symbol_table_entries(&self.source, &self.superblock, &table)?
                    .into_iter()
                    .collect()
            }
            GroupStorage::Compact(links) => links
                .into_iter()
                .filter_map(|link| link.target.map(|target| (link.name, target)))
                .collect(),
            GroupStorage::Dense => {
                warn!(address, "HDF5 group uses dense link storage; members skipped");
                BTreeMap::new()
            }
        };
        Ok(children.into_iter().collect())
    }
}
