//! Minimal HDF5 fixture writer
//!
//! Emits the oldest on-disk layout: superblock version 0, version 1 object
//! headers, symbol-table groups, and contiguous or chunked (v1 B-tree)
//! datasets. Enough to build MATLAB v7.3 style files for ingestion tests.

use anyhow::Result;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::Path;

const SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];
const SUPERBLOCK_LEN: usize = 96;
const UNDEFINED: u64 = u64::MAX;

const MSG_DATASPACE: u16 = 0x0001;
const MSG_DATATYPE: u16 = 0x0003;
const MSG_LAYOUT: u16 = 0x0008;
const MSG_FILTER_PIPELINE: u16 = 0x000B;
const MSG_SYMBOL_TABLE: u16 = 0x0011;

/// Element values of a dataset, row-major
#[derive(Debug, Clone)]
pub enum H5Data {
    F64(Vec<f64>),
    I32(Vec<i32>),
    /// Compound `{real, imag}` of float64
    Complex { real: Vec<f64>, imag: Vec<f64> },
    /// Fixed-length strings of `size` bytes each
    FixedString { size: usize, bytes: Vec<u8> },
}

#[derive(Debug, Clone)]
pub enum H5Node {
    Group {
        name: String,
        children: Vec<H5Node>,
    },
    Dataset {
        name: String,
        shape: Vec<u64>,
        data: H5Data,
        /// Chunk dimensions; `None` for contiguous storage
        chunks: Option<Vec<u64>>,
        deflate: bool,
    },
}

impl H5Node {
    pub fn group(name: &str, children: Vec<H5Node>) -> Self {
        H5Node::Group {
            name: name.to_string(),
            children,
        }
    }

    pub fn dataset(name: &str, shape: &[u64], data: H5Data) -> Self {
        H5Node::Dataset {
            name: name.to_string(),
            shape: shape.to_vec(),
            data,
            chunks: None,
            deflate: false,
        }
    }

    pub fn chunked(name: &str, shape: &[u64], data: H5Data, chunks: &[u64], deflate: bool) -> Self {
        H5Node::Dataset {
            name: name.to_string(),
            shape: shape.to_vec(),
            data,
            chunks: Some(chunks.to_vec()),
            deflate,
        }
    }

    fn name(&self) -> &str {
        match self {
            H5Node::Group { name, .. } | H5Node::Dataset { name, .. } => name,
        }
    }
}

/// Builder for a whole file
#[derive(Debug, Clone, Default)]
pub struct Hdf5Builder {
    matlab_userblock: bool,
    root: Vec<H5Node>,
}

impl Hdf5Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix the file with the 512-byte MATLAB v7.3 header
    pub fn matlab_v73() -> Self {
        Self {
            matlab_userblock: true,
            root: Vec::new(),
        }
    }

    pub fn node(mut self, node: H5Node) -> Self {
        self.root.push(node);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Output {
            buf: vec![0u8; SUPERBLOCK_LEN],
        };
        let root_address = write_group(&mut out, &self.root);
        let end_of_file = out.buf.len() as u64;

        let mut superblock = SIGNATURE.to_vec();
        superblock.extend([0, 0, 0, 0]); // versions
        superblock.extend([0, 8, 8, 0]); // reserved, offset size, length size, reserved
        superblock.extend(4u16.to_le_bytes()); // group leaf node K
        superblock.extend(16u16.to_le_bytes()); // group internal node K
        superblock.extend(0u32.to_le_bytes()); // consistency flags
        superblock.extend(0u64.to_le_bytes()); // base address
        superblock.extend(UNDEFINED.to_le_bytes()); // free-space info
        superblock.extend(end_of_file.to_le_bytes());
        superblock.extend(UNDEFINED.to_le_bytes()); // driver info
        // root group symbol table entry
        superblock.extend(0u64.to_le_bytes());
        superblock.extend(root_address.to_le_bytes());
        superblock.extend([0u8; 24]);
        out.buf[..SUPERBLOCK_LEN].copy_from_slice(&superblock);

        if !self.matlab_userblock {
            return out.buf;
        }
        let mut file = matlab_userblock();
        file.extend(out.buf);
        file
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }
}

fn matlab_userblock() -> Vec<u8> {
    let mut block =
        b"MATLAB 7.3 MAT-file, Platform: GLNXA64, Created by: tpa-service tests HDF5 schema 1.00 ."
            .to_vec();
    block.resize(116, b' ');
    block.extend([0u8; 8]);
    block.extend(0x0200u16.to_le_bytes());
    block.extend(b"IM");
    block.resize(512, 0);
    block
}

struct Output {
    buf: Vec<u8>,
}

impl Output {
    /// Append at the next 8-byte boundary and return the address
    fn append(&mut self, bytes: &[u8]) -> u64 {
        while self.buf.len() % 8 != 0 {
            self.buf.push(0);
        }
        let address = self.buf.len() as u64;
        self.buf.extend_from_slice(bytes);
        address
    }
}

fn pad8(len: usize) -> usize {
    len.div_ceil(8) * 8
}

fn object_header(messages: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (kind, data) in messages {
        let padded = pad8(data.len());
        body.extend(kind.to_le_bytes());
        body.extend((padded as u16).to_le_bytes());
        body.extend([0u8; 4]);
        body.extend(data);
        body.resize(body.len() + padded - data.len(), 0);
    }

    let mut header = vec![1u8, 0];
    header.extend((messages.len() as u16).to_le_bytes());
    header.extend(1u32.to_le_bytes()); // reference count
    header.extend((body.len() as u32).to_le_bytes());
    header.extend([0u8; 4]);
    header.extend(body);
    header
}

fn write_group(out: &mut Output, children: &[H5Node]) -> u64 {
    let mut entries: Vec<(String, u64)> = children
        .iter()
        .map(|child| {
            let address = match child {
                H5Node::Group { children, .. } => write_group(out, children),
                H5Node::Dataset {
                    shape,
                    data,
                    chunks,
                    deflate,
                    ..
                } => write_dataset(out, shape, data, chunks.as_deref(), *deflate),
            };
            (child.name().to_string(), address)
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    // local heap: offset 0 is the empty string
    let mut heap = vec![0u8; 8];
    let mut name_offsets = Vec::with_capacity(entries.len());
    for (name, _) in &entries {
        name_offsets.push(heap.len() as u64);
        heap.extend(name.as_bytes());
        heap.push(0);
        heap.resize(pad8(heap.len()), 0);
    }
    let heap_data = out.append(&heap);
    let mut heap_header = b"HEAP".to_vec();
    heap_header.extend([0u8; 4]);
    heap_header.extend((heap.len() as u64).to_le_bytes());
    heap_header.extend(UNDEFINED.to_le_bytes());
    heap_header.extend(heap_data.to_le_bytes());
    let heap_address = out.append(&heap_header);

    let mut node = b"SNOD".to_vec();
    node.extend([1, 0]);
    node.extend((entries.len() as u16).to_le_bytes());
    for ((_, address), name_offset) in entries.iter().zip(&name_offsets) {
        node.extend(name_offset.to_le_bytes());
        node.extend(address.to_le_bytes());
        node.extend([0u8; 24]);
    }
    let node_address = out.append(&node);

    let mut tree = b"TREE".to_vec();
    tree.extend([0u8, 0]); // group node, leaf level
    tree.extend(1u16.to_le_bytes());
    tree.extend(UNDEFINED.to_le_bytes());
    tree.extend(UNDEFINED.to_le_bytes());
    tree.extend(0u64.to_le_bytes());
    tree.extend(node_address.to_le_bytes());
    tree.extend(name_offsets.last().copied().unwrap_or(0).to_le_bytes());
    let tree_address = out.append(&tree);

    let mut table = tree_address.to_le_bytes().to_vec();
    table.extend(heap_address.to_le_bytes());
    out.append(&object_header(&[(MSG_SYMBOL_TABLE, table)]))
}

fn float64_type() -> Vec<u8> {
    let mut raw = vec![0x11, 0x20, 0x3f, 0x00];
    raw.extend(8u32.to_le_bytes());
    raw.extend([0, 0, 64, 0, 52, 11, 0, 52, 0xff, 0x03, 0, 0]);
    raw
}

fn compound_member(name: &str, offset: u32) -> Vec<u8> {
    let mut raw = name.as_bytes().to_vec();
    raw.push(0);
    raw.resize(pad8(raw.len()), 0);
    raw.extend(offset.to_le_bytes());
    raw.extend([0u8; 28]);
    raw.extend(float64_type());
    raw
}

/// (datatype message, element size, raw bytes)
fn encode(data: &H5Data) -> (Vec<u8>, usize, Vec<u8>) {
    match data {
        H5Data::F64(values) => (
            float64_type(),
            8,
            values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ),
        H5Data::I32(values) => {
            let mut datatype = vec![0x10, 0x08, 0x00, 0x00];
            datatype.extend(4u32.to_le_bytes());
            datatype.extend([0, 0, 32, 0]);
            (datatype, 4, values.iter().flat_map(|v| v.to_le_bytes()).collect())
        }
        H5Data::Complex { real, imag } => {
            let mut datatype = vec![0x16, 0x02, 0x00, 0x00];
            datatype.extend(16u32.to_le_bytes());
            datatype.extend(compound_member("real", 0));
            datatype.extend(compound_member("imag", 8));
            let raw = real
                .iter()
                .zip(imag)
                .flat_map(|(re, im)| re.to_le_bytes().into_iter().chain(im.to_le_bytes()))
                .collect();
            (datatype, 16, raw)
        }
        H5Data::FixedString { size, bytes } => {
            let mut datatype = vec![0x13, 0x00, 0x00, 0x00];
            datatype.extend((*size as u32).to_le_bytes());
            (datatype, *size, bytes.clone())
        }
    }
}

fn write_dataset(
    out: &mut Output,
    shape: &[u64],
    data: &H5Data,
    chunks: Option<&[u64]>,
    deflate: bool,
) -> u64 {
    let (datatype, element_size, raw) = encode(data);

    let mut dataspace = vec![1u8, shape.len() as u8, 0, 0, 0, 0, 0, 0];
    for dim in shape {
        dataspace.extend(dim.to_le_bytes());
    }
    let mut messages = vec![(MSG_DATASPACE, dataspace), (MSG_DATATYPE, datatype)];

    let layout = match chunks {
        None => {
            let address = out.append(&raw);
            let mut layout = vec![3u8, 1];
            layout.extend(address.to_le_bytes());
            layout.extend((raw.len() as u64).to_le_bytes());
            layout
        }
        Some(chunk_dims) => {
            let tree_address = write_chunks(out, shape, chunk_dims, element_size, &raw, deflate);
            let mut layout = vec![3u8, 2, shape.len() as u8 + 1];
            layout.extend(tree_address.to_le_bytes());
            for dim in chunk_dims {
                layout.extend((*dim as u32).to_le_bytes());
            }
            layout.extend((element_size as u32).to_le_bytes());
            if deflate {
                let mut pipeline = vec![1u8, 1, 0, 0, 0, 0, 0, 0];
                pipeline.extend(1u16.to_le_bytes()); // deflate
                pipeline.extend(0u16.to_le_bytes()); // name length
                pipeline.extend(0u16.to_le_bytes()); // flags
                pipeline.extend(1u16.to_le_bytes()); // client values
                pipeline.extend(6u32.to_le_bytes()); // level
                pipeline.extend([0u8; 4]);
                messages.push((MSG_FILTER_PIPELINE, pipeline));
            }
            layout
        }
    };
    messages.push((MSG_LAYOUT, layout));
    out.append(&object_header(&messages))
}

/// Write every chunk plus a single-leaf chunk B-tree; returns the tree address
fn write_chunks(
    out: &mut Output,
    shape: &[u64],
    chunk_dims: &[u64],
    element_size: usize,
    raw: &[u8],
    deflate: bool,
) -> u64 {
    let rank = shape.len();
    let grid: Vec<u64> = shape
        .iter()
        .zip(chunk_dims)
        .map(|(dim, chunk)| dim.div_ceil(*chunk))
        .collect();
    let chunk_count: u64 = grid.iter().product();
    let chunk_elements: u64 = chunk_dims.iter().product();

    let mut leaves = Vec::new();
    let mut cell = vec![0u64; rank];
    for _ in 0..chunk_count {
        let origin: Vec<u64> = cell.iter().zip(chunk_dims).map(|(c, d)| c * d).collect();

        let mut chunk = Vec::with_capacity(chunk_elements as usize * element_size);
        let mut index = vec![0u64; rank];
        for _ in 0..chunk_elements {
            let mut linear = 0u64;
            let mut inside = true;
            for axis in 0..rank {
                let position = origin[axis] + index[axis];
                if position >= shape[axis] {
                    inside = false;
                    break;
                }
                linear = linear * shape[axis] + position;
            }
            if inside {
                let start = linear as usize * element_size;
                chunk.extend_from_slice(&raw[start..start + element_size]);
            } else {
                chunk.extend(std::iter::repeat(0u8).take(element_size));
            }
            increment(&mut index, chunk_dims);
        }

        let stored = if deflate {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
            encoder.write_all(&chunk).unwrap();
            encoder.finish().unwrap()
        } else {
            chunk
        };
        let address = out.append(&stored);
        leaves.push((origin, stored.len(), address));
        increment(&mut cell, &grid);
    }

    let mut tree = b"TREE".to_vec();
    tree.extend([1u8, 0]); // chunk node, leaf level
    tree.extend((leaves.len() as u16).to_le_bytes());
    tree.extend(UNDEFINED.to_le_bytes());
    tree.extend(UNDEFINED.to_le_bytes());
    for (origin, size, address) in &leaves {
        tree.extend((*size as u32).to_le_bytes());
        tree.extend(0u32.to_le_bytes()); // filter mask
        for offset in origin {
            tree.extend(offset.to_le_bytes());
        }
        tree.extend(0u64.to_le_bytes());
        tree.extend(address.to_le_bytes());
    }
    // final key bounds the dataset
    tree.extend(0u32.to_le_bytes());
    tree.extend(0u32.to_le_bytes());
    for dim in shape {
        tree.extend(dim.to_le_bytes());
    }
    tree.extend(0u64.to_le_bytes());
    out.append(&tree)
}

/// Row-major odometer step
fn increment(index: &mut [u64], bounds: &[u64]) {
    for axis in (0..index.len()).rev() {
        index[axis] += 1;
        if index[axis] < bounds[axis] {
            return;
        }
        index[axis] = 0;
    }
}
