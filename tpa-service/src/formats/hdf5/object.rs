//! Object headers
//!
//! Collects the messages of an object header (following continuation blocks)
//! and interprets them as either a group or a dataset.

use std::collections::HashSet;

use super::cursor::ByteCursor;
use super::header::{Source, Superblock};
use super::messages::{
    parse_filter_pipeline, parse_link_info_heap, Dataspace, Datatype, Filter, Layout, Link,
    SymbolTable, MSG_CONTINUATION, MSG_DATASPACE, MSG_DATATYPE, MSG_FILTER_PIPELINE, MSG_LAYOUT,
    MSG_LINK, MSG_LINK_INFO, MSG_NIL, MSG_SYMBOL_TABLE,
};
use super::Hdf5Error;

/// A header message with its undecoded body
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub kind: u16,
    pub data: Vec<u8>,
}

/// What an object header describes
#[derive(Debug, Clone)]
pub enum ObjectKind {
    Group(GroupStorage),
    Dataset(DatasetHeader),
    /// Committed datatypes and anything else without data or links
    Other,
}

/// How a group stores its members
#[derive(Debug, Clone)]
pub enum GroupStorage {
    SymbolTable(SymbolTable),
    /// Links held in the header itself
    Compact(Vec<Link>),
    /// Links in a fractal heap; not supported
    Dense,
}

/// Everything needed to describe and read a dataset
#[derive(Debug, Clone)]
pub struct DatasetHeader {
    pub dataspace: Dataspace,
    pub datatype: Datatype,
    pub layout: Layout,
    pub filters: Vec<Filter>,
}

impl DatasetHeader {
    pub fn shape(&self) -> Vec<usize> {
        self.dataspace.shape()
    }

    pub fn element_count(&self) -> usize {
        self.dataspace.element_count()
    }

    pub fn dtype_name(&self) -> String {
        self.datatype.dtype_name()
    }
}

const MAX_HEADER_BLOCKS: usize = 1024;

pub fn read_object(
    source: &Source,
    superblock: &Superblock,
    address: u64,
) -> Result<ObjectKind, Hdf5Error> {
    let messages = read_messages(source, superblock, address)?;
    classify(&messages, superblock)
}

fn classify(messages: &[RawMessage], superblock: &Superblock) -> Result<ObjectKind, Hdf5Error> {
    let (o, l) = (superblock.offset_size, superblock.length_size);
    let find = |kind: u16| messages.iter().find(|m| m.kind == kind);

    if let Some(layout) = find(MSG_LAYOUT) {
        let dataspace = find(MSG_DATASPACE)
            .ok_or_else(|| Hdf5Error::Corrupt("dataset without dataspace".to_string()))?;
        let datatype = find(MSG_DATATYPE)
            .ok_or_else(|| Hdf5Error::Corrupt("dataset without datatype".to_string()))?;
        let filters = match find(MSG_FILTER_PIPELINE) {
            Some(message) => parse_filter_pipeline(&mut ByteCursor::new(&message.data))?,
            None => Vec::new(),
        };
        return Ok(ObjectKind::Dataset(DatasetHeader {
            dataspace: Dataspace::parse(&mut ByteCursor::new(&dataspace.data), l)?,
            datatype: Datatype::parse(&mut ByteCursor::new(&datatype.data))?,
            layout: Layout::parse(&mut ByteCursor::new(&layout.data), o, l)?,
            filters,
        }));
    }

    if let Some(table) = find(MSG_SYMBOL_TABLE) {
        let table = SymbolTable::parse(&mut ByteCursor::new(&table.data), o)?;
        return Ok(ObjectKind::Group(GroupStorage::SymbolTable(table)));
    }

    if let Some(info) = find(MSG_LINK_INFO) {
        let heap = parse_link_info_heap(&mut ByteCursor::new(&info.data), o)?;
        if !superblock.is_undefined(heap) {
            return Ok(ObjectKind::Group(GroupStorage::Dense));
        }
    }

    let links = messages
        .iter()
        .filter(|m| m.kind == MSG_LINK)
        .map(|m| Link::parse(&mut ByteCursor::new(&m.data), o))
        .collect::<Result<Vec<_>, _>>()?;
    if !links.is_empty() || find(MSG_LINK_INFO).is_some() {
        return Ok(ObjectKind::Group(GroupStorage::Compact(links)));
    }

    Ok(ObjectKind::Other)
}

/// All messages of the header at `address`, continuation blocks included
pub fn read_messages(
    source: &Source,
    superblock: &Superblock,
    address: u64,
) -> Result<Vec<RawMessage>, Hdf5Error> {
    let prefix = source.read_up_to(address, 64)?;
    if prefix.starts_with(b"OHDR") {
        read_v2(source, superblock, address, &prefix)
    } else {
        read_v1(source, superblock, address, &prefix)
    }
}

fn read_v1(
    source: &Source,
    superblock: &Superblock,
    address: u64,
    prefix: &[u8],
) -> Result<Vec<RawMessage>, Hdf5Error> {
    let mut cursor = ByteCursor::new(prefix);
    let version = cursor.u8()?;
    if version != 1 {
        return Err(Hdf5Error::Unsupported(format!("object header version {version}")));
    }
    cursor.skip(3)?; // reserved, message count
    cursor.skip(4)?; // reference count
    let size = cursor.u32()? as usize;

    let mut messages = Vec::new();
    let mut pending = vec![(address + 16, size)];
    let mut visited = HashSet::new();

    while let Some((block_address, block_size)) = pending.pop() {
        if !visited.insert(block_address) || visited.len() > MAX_HEADER_BLOCKS {
            return Err(Hdf5Error::Corrupt("object header continuation loop".to_string()));
        }
        let block = source.read_at(block_address, block_size)?;
        let mut cursor = ByteCursor::new(&block);
        while cursor.remaining() >= 8 {
            let kind = cursor.u16()?;
            let size = usize::from(cursor.u16()?);
            cursor.skip(4)?; // flags, reserved
            let data = cursor.bytes(size)?.to_vec();
            push_message(kind, data, superblock, &mut messages, &mut pending)?;
        }
    }
    Ok(messages)
}

fn read_v2(
    source: &Source,
    superblock: &Superblock,
    address: u64,
    prefix: &[u8],
) -> Result<Vec<RawMessage>, Hdf5Error> {
    let mut cursor = ByteCursor::new(prefix);
    cursor.skip(4)?;
    let version = cursor.u8()?;
    if version != 2 {
        return Err(Hdf5Error::Unsupported(format!("object header version {version}")));
    }
    let flags = cursor.u8()?;
    if flags & 0x20 != 0 {
        cursor.skip(16)?; // timestamps
    }
    if flags & 0x10 != 0 {
        cursor.skip(4)?; // attribute phase change
    }
    let chunk_size = cursor.uint(1 << (flags & 0x03))? as usize;
    let tracks_order = flags & 0x04 != 0;

    let mut messages = Vec::new();
    // (address, size) of the message region of each chunk
    let mut pending = vec![(address + cursor.position() as u64, chunk_size)];
    let mut visited = HashSet::new();

    while let Some((block_address, block_size)) = pending.pop() {
        if !visited.insert(block_address) || visited.len() > MAX_HEADER_BLOCKS {
            return Err(Hdf5Error::Corrupt("object header continuation loop".to_string()));
        }
        let block = source.read_at(block_address, block_size)?;
        let mut cursor = ByteCursor::new(&block);
        let header_len = if tracks_order { 6 } else { 4 };
        while cursor.remaining() >= header_len {
            let kind = u16::from(cursor.u8()?);
            let size = usize::from(cursor.u16()?);
            cursor.skip(header_len - 3)?;
            let data = cursor.bytes(size)?.to_vec();
            let before = pending.len();
            push_message(kind, data, superblock, &mut messages, &mut pending)?;
            // continuation targets are OCHK chunks: skip signature, drop checksum
            if pending.len() > before {
                if let Some((target, length)) = pending.pop() {
                    let signature = source.read_at(target, 4)?;
                    if signature != b"OCHK" {
                        return Err(Hdf5Error::Corrupt("missing OCHK signature".to_string()));
                    }
                    pending.push((target + 4, length.saturating_sub(8)));
                }
            }
        }
    }
    Ok(messages)
}

fn push_message(
    kind: u16,
    data: Vec<u8>,
    superblock: &Superblock,
    messages: &mut Vec<RawMessage>,
    pending: &mut Vec<(u64, usize)>,
) -> Result<(), Hdf5Error> {
    match kind {
        MSG_NIL => {}
        MSG_CONTINUATION => {
            let mut cursor = ByteCursor::new(&data);
            let target = cursor.uint(superblock.offset_size)?;
            let length = cursor.uint(superblock.length_size)? as usize;
            pending.push((target, length));
        }
        _ => messages.push(RawMessage { kind, data }),
    }
    Ok(())
}
