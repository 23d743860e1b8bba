//! Version 1 B-trees, symbol tables and raw data access

use flate2::read::ZlibDecoder;
use std::collections::HashSet;
use std::io::Read;

use super::cursor::ByteCursor;
use super::header::{Source, Superblock};
use super::messages::{
    checked_product, Datatype, Filter, Layout, SymbolTable, FILTER_DEFLATE, FILTER_FLETCHER32,
    FILTER_SHUFFLE,
};
use super::object::DatasetHeader;
use super::Hdf5Error;

const BTREE_GROUP: u8 = 0;
const BTREE_CHUNK: u8 = 1;
const MAX_BTREE_NODES: usize = 1 << 16;

/// Child of a v1 B-tree leaf plus its key (chunk trees only use the key)
struct LeafEntry {
    key: Vec<u8>,
    address: u64,
}

/// Walk a v1 B-tree and return all leaf children, left to right
fn btree_leaves(
    source: &Source,
    superblock: &Superblock,
    root: u64,
    node_type: u8,
    key_size: usize,
) -> Result<Vec<LeafEntry>, Hdf5Error> {
    let o = superblock.offset_size;
    let mut leaves = Vec::new();
    let mut stack = vec![root];
    let mut visited = HashSet::new();

    while let Some(address) = stack.pop() {
        if !visited.insert(address) || visited.len() > MAX_BTREE_NODES {
            return Err(Hdf5Error::Corrupt("B-tree cycle".to_string()));
        }
        let prefix = source.read_at(address, 8 + 2 * o)?;
        let mut cursor = ByteCursor::new(&prefix);
        cursor.signature(b"TREE", "B-tree node")?;
        if cursor.u8()? != node_type {
            return Err(Hdf5Error::Corrupt("unexpected B-tree node type".to_string()));
        }
        let level = cursor.u8()?;
        let entries = usize::from(cursor.u16()?);

        // keys and children interleave: key0 child0 key1 child1 ... keyN
        let body_len = entries * (key_size + o) + key_size;
        let body = source.read_at(address + prefix.len() as u64, body_len)?;
        let mut cursor = ByteCursor::new(&body);
        let mut children = Vec::with_capacity(entries);
        for _ in 0..entries {
            let key = cursor.bytes(key_size)?.to_vec();
            let child = cursor.uint(o)?;
            children.push(LeafEntry {
                key,
                address: child,
            });
        }

        if level == 0 {
            leaves.extend(children);
        } else {
            // reversed so the leftmost subtree is visited first
            stack.extend(children.iter().rev().map(|c| c.address));
        }
    }
    Ok(leaves)
}

/// Name and object header address of every entry in an old-style group
pub fn symbol_table_entries(
    source: &Source,
    superblock: &Superblock,
    table: &SymbolTable,
) -> Result<Vec<(String, u64)>, Hdf5Error> {
    let o = superblock.offset_size;
    let l = superblock.length_size;
    let heap = LocalHeap::read(source, superblock, table.heap_address)?;

    let mut entries = Vec::new();
    for node in btree_leaves(source, superblock, table.btree_address, BTREE_GROUP, l)? {
        let prefix = source.read_at(node.address, 8)?;
        let mut cursor = ByteCursor::new(&prefix);
        cursor.signature(b"SNOD", "symbol table node")?;
        cursor.skip(2)?; // version, reserved
        let count = usize::from(cursor.u16()?);

        let entry_size = 2 * o + 24;
        let body = source.read_at(node.address + 8, count * entry_size)?;
        let mut cursor = ByteCursor::new(&body);
        for _ in 0..count {
            let name_offset = cursor.uint(o)? as usize;
            let header = cursor.uint(o)?;
            cursor.skip(24)?; // cache type, reserved, scratch pad
            entries.push((heap.name_at(name_offset)?, header));
        }
    }
    Ok(entries)
}

/// Local heap holding symbol names
struct LocalHeap {
    data: Vec<u8>,
}

impl LocalHeap {
    fn read(source: &Source, superblock: &Superblock, address: u64) -> Result<Self, Hdf5Error> {
        let (o, l) = (superblock.offset_size, superblock.length_size);
        let raw = source.read_at(address, 8 + 2 * l + o)?;
        let mut cursor = ByteCursor::new(&raw);
        cursor.signature(b"HEAP", "local heap")?;
        cursor.skip(4)?; // version, reserved
        let size = cursor.uint(l)? as usize;
        cursor.skip(l)?; // free list head
        let data_address = cursor.uint(o)?;
        Ok(LocalHeap {
            data: source.read_at(data_address, size)?,
        })
    }

    fn name_at(&self, offset: usize) -> Result<String, Hdf5Error> {
        let mut cursor = ByteCursor::new(&self.data);
        cursor.seek(offset)?;
        cursor.c_string()
    }
}

/// Raw, defiltered bytes of a whole dataset in row-major order
pub fn read_raw(
    source: &Source,
    superblock: &Superblock,
    dataset: &DatasetHeader,
) -> Result<Vec<u8>, Hdf5Error> {
    let element_size = dataset.datatype.size();
    let total = dataset
        .element_count()
        .checked_mul(element_size)
        .ok_or_else(|| Hdf5Error::Corrupt("dataset size overflow".to_string()))?;

    match &dataset.layout {
        Layout::Compact(bytes) => {
            let mut data = bytes.clone();
            data.resize(total, 0);
            Ok(data)
        }
        Layout::Contiguous { address } => {
            if superblock.is_undefined(*address) {
                // never written: fill value
                Ok(vec![0; total])
            } else {
                source.read_at(*address, total)
            }
        }
        Layout::Chunked {
            btree_address,
            chunk_dims,
        } => read_chunked(source, superblock, dataset, *btree_address, chunk_dims, total),
    }
}

fn read_chunked(
    source: &Source,
    superblock: &Superblock,
    dataset: &DatasetHeader,
    btree_address: u64,
    chunk_dims: &[u64],
    total: usize,
) -> Result<Vec<u8>, Hdf5Error> {
    let element_size = dataset.datatype.size();
    let dims = &dataset.dataspace.dims;
    let mut output = vec![0u8; total];
    if superblock.is_undefined(btree_address) || total == 0 {
        return Ok(output);
    }
    if chunk_dims.len() != dims.len() {
        return Err(Hdf5Error::Corrupt("chunk rank differs from dataset rank".to_string()));
    }

    let rank = dims.len();
    let chunk_elements = checked_product(chunk_dims)
        .ok_or_else(|| Hdf5Error::Corrupt("chunk element count overflow".to_string()))?;
    let chunk_bytes = chunk_elements
        .checked_mul(element_size)
        .ok_or_else(|| Hdf5Error::Corrupt("chunk size overflow".to_string()))?;
    // chunk size, filter mask, rank + 1 offsets
    let key_size = 8 + 8 * (rank + 1);
    for leaf in btree_leaves(source, superblock, btree_address, BTREE_CHUNK, key_size)? {
        let mut key = ByteCursor::new(&leaf.key);
        let stored_size = key.u32()? as usize;
        let filter_mask = key.u32()?;
        let origin = (0..rank).map(|_| key.u64()).collect::<Result<Vec<_>, _>>()?;

        let stored = source.read_at(leaf.address, stored_size)?;
        let chunk = apply_filters(
            stored,
            &dataset.filters,
            filter_mask,
            element_size,
            chunk_bytes,
        )?;
        scatter_chunk(&chunk, &origin, chunk_dims, dims, element_size, &mut output)?;
    }
    Ok(output)
}

/// Copy a chunk's elements into their place in the full row-major array
fn scatter_chunk(
    chunk: &[u8],
    origin: &[u64],
    chunk_dims: &[u64],
    dims: &[u64],
    element_size: usize,
    output: &mut [u8],
) -> Result<(), Hdf5Error> {
    let rank = dims.len();
    let chunk_elements = checked_product(chunk_dims)
        .ok_or_else(|| Hdf5Error::Corrupt("chunk element count overflow".to_string()))?;
    let mut index = vec![0u64; rank];

    for element in 0..chunk_elements {
        let mut linear = 0u64;
        let mut inside = true;
        for axis in 0..rank {
            let position = origin[axis]
                .checked_add(index[axis])
                .ok_or_else(|| Hdf5Error::Corrupt("chunk offset overflow".to_string()))?;
            if position >= dims[axis] {
                inside = false;
                break;
            }
            linear = linear * dims[axis] + position;
        }

        let src = element * element_size;
        if inside && src + element_size <= chunk.len() {
            let dst = linear as usize * element_size;
            output[dst..dst + element_size].copy_from_slice(&chunk[src..src + element_size]);
        }

        // row-major increment of the in-chunk index
        for axis in (0..rank).rev() {
            index[axis] += 1;
            if index[axis] < chunk_dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    Ok(())
}

/// Undo the filter pipeline (filters are reversed in pipeline order)
///
/// `chunk_bytes` is the size of the defiltered chunk. Inflated output may not
/// exceed it, plus room for a checksum when the pipeline carries one.
pub fn apply_filters(
    mut data: Vec<u8>,
    filters: &[Filter],
    mask: u32,
    element_size: usize,
    chunk_bytes: usize,
) -> Result<Vec<u8>, Hdf5Error> {
    let checksum = if filters.iter().any(|f| f.id == FILTER_FLETCHER32) {
        4
    } else {
        0
    };
    let inflate_limit = chunk_bytes.saturating_add(checksum);

    for (position, filter) in filters.iter().enumerate().rev() {
        if mask & (1 << position) != 0 {
            continue;
        }
        data = match filter.id {
            FILTER_DEFLATE => inflate(&data, inflate_limit)?,
            FILTER_SHUFFLE => {
                let size = filter
                    .client_data
                    .first()
                    .map(|v| *v as usize)
                    .unwrap_or(element_size);
                unshuffle(&data, size)
            }
            // checksum is not verified
            FILTER_FLETCHER32 => {
                let keep = data.len().saturating_sub(4);
                data.truncate(keep);
                data
            }
            other => return Err(Hdf5Error::Unsupported(format!("filter {other}"))),
        };
    }
    Ok(data)
}

fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>, Hdf5Error> {
    let mut decoder = ZlibDecoder::new(data).take((limit as u64).saturating_add(1));
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Hdf5Error::Decompress(e.to_string()))?;
    if out.len() > limit {
        return Err(Hdf5Error::Decompress(format!(
            "chunk inflates past its {limit} byte size"
        )));
    }
    Ok(out)
}

/// Byte-shuffle inverse: byte `b` of every element was stored contiguously
pub fn unshuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 {
        return data.to_vec();
    }
    let count = data.len() / element_size;
    let body = count * element_size;
    let mut out = vec![0u8; data.len()];
    for byte in 0..element_size {
        for element in 0..count {
            out[element * element_size + byte] = data[byte * count + element];
        }
    }
    out[body..].copy_from_slice(&data[body..]);
    out
}

pub fn is_numeric(datatype: &Datatype) -> bool {
    match datatype {
        Datatype::Float { size, .. } => matches!(size, 4 | 8),
        Datatype::Integer { size, .. } => (1..=8).contains(size),
        Datatype::Enum { base, .. } => is_numeric(base),
        _ => false,
    }
}

/// Decode raw elements to f64; `None` for non-numeric types
pub fn decode_numeric(raw: &[u8], datatype: &Datatype) -> Option<Vec<f64>> {
    let size = datatype.size();
    if size == 0 {
        return None;
    }
    let elements = raw.chunks_exact(size);
    match datatype {
        Datatype::Float { size: 4, big_endian } => Some(
            elements
                .map(|b| {
                    let bytes = [b[0], b[1], b[2], b[3]];
                    f64::from(if *big_endian {
                        f32::from_be_bytes(bytes)
                    } else {
                        f32::from_le_bytes(bytes)
                    })
                })
                .collect(),
        ),
        Datatype::Float { size: 8, big_endian } => Some(
            elements
                .map(|b| {
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(b);
                    if *big_endian {
                        f64::from_be_bytes(bytes)
                    } else {
                        f64::from_le_bytes(bytes)
                    }
                })
                .collect(),
        ),
        Datatype::Integer {
            size: 1..=8,
            signed,
            big_endian,
        } => Some(
            elements
                .map(|b| decode_integer(b, *signed, *big_endian))
                .collect(),
        ),
        Datatype::Enum { base, .. } => decode_numeric(raw, base),
        _ => None,
    }
}

fn decode_integer(bytes: &[u8], signed: bool, big_endian: bool) -> f64 {
    let mut le = bytes.to_vec();
    if big_endian {
        le.reverse();
    }
    let bits = le.len() * 8;
    let value = le
        .iter()
        .rev()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
    if signed && bits < 64 && value & (1 << (bits - 1)) != 0 {
        (value as i64 - (1i64 << bits)) as f64
    } else if signed {
        value as i64 as f64
    } else {
        value as f64
    }
}

/// Split `{real, imag}` compound elements into two arrays
pub fn decode_complex(raw: &[u8], datatype: &Datatype) -> Option<(Vec<f64>, Vec<f64>)> {
    let (real, imag) = datatype.complex_parts()?;
    let size = datatype.size();
    let part = |member: &super::messages::CompoundMember| -> Option<Vec<f64>> {
        let width = member.datatype.size();
        let bytes: Vec<u8> = raw
            .chunks_exact(size)
            .flat_map(|element| element.get(member.offset..member.offset + width))
            .flatten()
            .copied()
            .collect();
        decode_numeric(&bytes, &member.datatype)
    };
    Some((part(real)?, part(imag)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_unshuffle_restores_elements() {
        // two u16 elements 0x0201, 0x0403 shuffled: low bytes first, then high bytes
        let shuffled = [0x01, 0x03, 0x02, 0x04, 0xee];
        assert_eq!(unshuffle(&shuffled, 2), vec![0x01, 0x02, 0x03, 0x04, 0xee]);
    }

    #[test]
    fn test_filters_run_in_reverse_and_respect_mask() {
        let plain: Vec<u8> = (0u8..32).collect();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&plain).unwrap();
        let compressed = encoder.finish().unwrap();

        let filters = vec![Filter {
            id: FILTER_DEFLATE,
            client_data: vec![6],
        }];
        assert_eq!(apply_filters(compressed, &filters, 0, 8, 32).unwrap(), plain);
        // masked filter is skipped
        assert_eq!(apply_filters(plain.clone(), &filters, 1, 8, 32).unwrap(), plain);
    }

    #[test]
    fn test_corrupt_deflate_stream() {
        let filters = vec![Filter {
            id: FILTER_DEFLATE,
            client_data: Vec::new(),
        }];
        let err = apply_filters(vec![1, 2, 3, 4], &filters, 0, 8, 64).unwrap_err();
        assert!(matches!(err, Hdf5Error::Decompress(_)));
    }

    #[test]
    fn test_inflate_stops_at_chunk_size() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&vec![0u8; 1 << 20]).unwrap();
        let bomb = encoder.finish().unwrap();
        let deflate = Filter {
            id: FILTER_DEFLATE,
            client_data: vec![9],
        };

        let err = apply_filters(bomb.clone(), &[deflate.clone()], 0, 8, 64).unwrap_err();
        assert!(matches!(err, Hdf5Error::Decompress(_)));

        // exact size passes, and a checksum stage leaves room for 4 more bytes
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[1u8; 68]).unwrap();
        let with_checksum = encoder.finish().unwrap();
        let fletcher = Filter {
            id: FILTER_FLETCHER32,
            client_data: Vec::new(),
        };
        let plain = apply_filters(with_checksum.clone(), &[fletcher, deflate.clone()], 0, 8, 64)
            .unwrap();
        assert_eq!(plain, vec![1u8; 64]);
        assert!(apply_filters(with_checksum, &[deflate], 0, 8, 64).is_err());
    }

    #[test]
    fn test_scatter_partial_edge_chunk() {
        // 3x3 dataset, 2x2 chunk at origin (2, 2): only one element lands
        let mut output = vec![0u8; 9];
        scatter_chunk(&[7, 8, 9, 10], &[2, 2], &[2, 2], &[3, 3], 1, &mut output).unwrap();
        assert_eq!(output, vec![0, 0, 0, 0, 0, 0, 0, 0, 7]);

        let mut output = vec![0u8; 9];
        scatter_chunk(&[1, 2, 3, 4], &[0, 1], &[2, 2], &[3, 3], 1, &mut output).unwrap();
        assert_eq!(output, vec![0, 1, 2, 0, 3, 4, 0, 0, 0]);
    }

    #[test]
    fn test_scatter_rejects_overflowing_chunk_origin() {
        let mut output = vec![0u8; 9];
        let err = scatter_chunk(&[1, 2, 3, 4], &[u64::MAX, 0], &[2, 2], &[3, 3], 1, &mut output)
            .unwrap_err();
        assert!(matches!(err, Hdf5Error::Corrupt(_)));

        let err = scatter_chunk(&[], &[0, 0], &[u64::MAX, 4], &[3, 3], 1, &mut output).unwrap_err();
        assert!(matches!(err, Hdf5Error::Corrupt(_)));
    }

    #[test]
    fn test_integer_decoding() {
        let signed = Datatype::Integer {
            size: 2,
            signed: true,
            big_endian: false,
        };
        let raw = [0xff, 0xff, 0x02, 0x00];
        assert_eq!(decode_numeric(&raw, &signed), Some(vec![-1.0, 2.0]));

        let unsigned_be = Datatype::Integer {
            size: 2,
            signed: false,
            big_endian: true,
        };
        assert_eq!(decode_numeric(&[0x01, 0x00], &unsigned_be), Some(vec![256.0]));
        assert_eq!(decode_numeric(&raw, &Datatype::String { size: 2 }), None);
    }
}
