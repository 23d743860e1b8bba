//! Object header message decoders

use super::cursor::ByteCursor;
use super::Hdf5Error;

pub const MSG_NIL: u16 = 0x0000;
pub const MSG_DATASPACE: u16 = 0x0001;
pub const MSG_LINK_INFO: u16 = 0x0002;
pub const MSG_DATATYPE: u16 = 0x0003;
pub const MSG_LINK: u16 = 0x0006;
pub const MSG_LAYOUT: u16 = 0x0008;
pub const MSG_FILTER_PIPELINE: u16 = 0x000B;
pub const MSG_CONTINUATION: u16 = 0x0010;
pub const MSG_SYMBOL_TABLE: u16 = 0x0011;

/// Dataset extent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    /// Empty for scalars
    pub dims: Vec<u64>,
    /// Null dataspace (no elements at all)
    pub null: bool,
}

impl Dataspace {
    pub fn parse(cursor: &mut ByteCursor<'_>, length_size: usize) -> Result<Self, Hdf5Error> {
        let version = cursor.u8()?;
        let rank = usize::from(cursor.u8()?);
        cursor.skip(1)?; // flags
        let null = match version {
            1 => {
                cursor.skip(5)?;
                false
            }
            2 => cursor.u8()? == 2,
            other => {
                return Err(Hdf5Error::Unsupported(format!("dataspace version {other}")));
            }
        };
        let dims = (0..rank)
            .map(|_| cursor.uint(length_size))
            .collect::<Result<Vec<_>, _>>()?;
        if checked_product(&dims).is_none() {
            return Err(Hdf5Error::Corrupt("dataspace element count overflow".to_string()));
        }
        // maximum dimensions may follow
        Ok(Dataspace { dims, null })
    }

    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(|d| *d as usize).collect()
    }

    /// Saturates at `usize::MAX`, which no element limit admits
    pub fn element_count(&self) -> usize {
        if self.null {
            0
        } else {
            checked_product(&self.dims).unwrap_or(usize::MAX)
        }
    }
}

/// Product of extents, `None` if it does not fit in `usize`
pub fn checked_product(dims: &[u64]) -> Option<usize> {
    dims.iter().try_fold(1usize, |count, dim| {
        usize::try_from(*dim).ok().and_then(|dim| count.checked_mul(dim))
    })
}

/// Element type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datatype {
    Integer { size: usize, signed: bool, big_endian: bool },
    Float { size: usize, big_endian: bool },
    String { size: usize },
    Time { size: usize },
    Bitfield { size: usize },
    Opaque { size: usize },
    Compound { size: usize, members: Vec<CompoundMember> },
    Reference { size: usize },
    Enum { size: usize, base: Box<Datatype> },
    VarLen { size: usize, is_string: bool },
    Array { size: usize, dims: Vec<u32>, base: Box<Datatype> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundMember {
    pub name: String,
    pub offset: usize,
    pub datatype: Datatype,
}

impl Datatype {
    pub fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, Hdf5Error> {
        let class_and_version = cursor.u8()?;
        let class = class_and_version & 0x0f;
        let version = class_and_version >> 4;
        let bits = cursor.bytes(3)?;
        let (b0, b1) = (bits[0], bits[1]);
        let size = cursor.u32()? as usize;

        let datatype = match class {
            0 => {
                cursor.skip(4)?; // bit offset, precision
                Datatype::Integer {
                    size,
                    signed: b0 & 0x08 != 0,
                    big_endian: b0 & 0x01 != 0,
                }
            }
            1 => {
                cursor.skip(12)?;
                Datatype::Float {
                    size,
                    big_endian: b0 & 0x01 != 0,
                }
            }
            2 => {
                cursor.skip(2)?;
                Datatype::Time { size }
            }
            3 => Datatype::String { size },
            4 => {
                cursor.skip(4)?;
                Datatype::Bitfield { size }
            }
            5 => {
                // NUL-padded ASCII tag, length in the low class bits
                cursor.skip(usize::from(b0))?;
                Datatype::Opaque { size }
            }
            6 => {
                let count = usize::from(u16::from_le_bytes([b0, b1]));
                let members = (0..count)
                    .map(|_| CompoundMember::parse(cursor, version, size))
                    .collect::<Result<Vec<_>, _>>()?;
                Datatype::Compound { size, members }
            }
            7 => Datatype::Reference { size },
            8 => {
                let count = usize::from(u16::from_le_bytes([b0, b1]));
                let base = Datatype::parse(cursor)?;
                for _ in 0..count {
                    let start = cursor.position();
                    cursor.c_string()?;
                    if version < 3 {
                        skip_name_padding(cursor, start)?;
                    }
                }
                cursor.skip(count * base.size())?;
                Datatype::Enum {
                    size,
                    base: Box::new(base),
                }
            }
            9 => {
                Datatype::parse(cursor)?; // base type
                Datatype::VarLen {
                    size,
                    is_string: b0 & 0x0f == 1,
                }
            }
            10 => {
                let rank = usize::from(cursor.u8()?);
                if version < 3 {
                    cursor.skip(3)?;
                }
                let dims = (0..rank)
                    .map(|_| cursor.u32())
                    .collect::<Result<Vec<_>, _>>()?;
                if version < 3 {
                    cursor.skip(4 * rank)?; // permutation
                }
                let base = Datatype::parse(cursor)?;
                Datatype::Array {
                    size,
                    dims,
                    base: Box::new(base),
                }
            }
            other => {
                return Err(Hdf5Error::Unsupported(format!("datatype class {other}")));
            }
        };
        Ok(datatype)
    }

    /// Element size in bytes
    pub fn size(&self) -> usize {
        match self {
            Datatype::Integer { size, .. }
            | Datatype::Float { size, .. }
            | Datatype::String { size }
            | Datatype::Time { size }
            | Datatype::Bitfield { size }
            | Datatype::Opaque { size }
            | Datatype::Compound { size, .. }
            | Datatype::Reference { size }
            | Datatype::Enum { size, .. }
            | Datatype::VarLen { size, .. }
            | Datatype::Array { size, .. } => *size,
        }
    }

    /// `{real, imag}` float pair as written by MATLAB / h5py for complex data
    pub fn complex_parts(&self) -> Option<(&CompoundMember, &CompoundMember)> {
        let Datatype::Compound { members, .. } = self else {
            return None;
        };
        let [first, second] = members.as_slice() else {
            return None;
        };
        let is_float = |m: &CompoundMember| matches!(m.datatype, Datatype::Float { .. });
        let real_name = matches!(first.name.as_str(), "r" | "real");
        let imag_name = matches!(second.name.as_str(), "i" | "imag");
        (real_name && imag_name && is_float(first) && is_float(second)
            && first.datatype.size() == second.datatype.size())
        .then_some((first, second))
    }

    /// NumPy-style type name
    pub fn dtype_name(&self) -> String {
        match self {
            Datatype::Integer { size, signed, .. } => {
                format!("{}int{}", if *signed { "" } else { "u" }, size * 8)
            }
            Datatype::Float { size, .. } => format!("float{}", size * 8),
            Datatype::String { size } => format!("|S{size}"),
            Datatype::Compound { size, .. } if self.complex_parts().is_some() => {
                format!("complex{}", size * 8)
            }
            Datatype::Compound { size, .. }
            | Datatype::Time { size }
            | Datatype::Bitfield { size }
            | Datatype::Opaque { size } => format!("|V{size}"),
            Datatype::Reference { .. } | Datatype::VarLen { .. } => "object".to_string(),
            Datatype::Enum { base, .. } | Datatype::Array { base, .. } => base.dtype_name(),
        }
    }
}

impl CompoundMember {
    fn parse(
        cursor: &mut ByteCursor<'_>,
        version: u8,
        compound_size: usize,
    ) -> Result<Self, Hdf5Error> {
        let start = cursor.position();
        let name = cursor.c_string()?;
        match version {
            1 | 2 => {
                skip_name_padding(cursor, start)?;
                let offset = cursor.u32()? as usize;
                if version == 1 {
                    // rank, reserved, permutation, reserved, 4 dimension sizes
                    cursor.skip(1 + 3 + 4 + 4 + 16)?;
                }
                let datatype = Datatype::parse(cursor)?;
                Ok(CompoundMember {
                    name,
                    offset,
                    datatype,
                })
            }
            3 => {
                let offset_width = match compound_size {
                    0..=0xff => 1,
                    0x100..=0xffff => 2,
                    0x1_0000..=0xff_ffff => 3,
                    _ => 4,
                };
                let offset = cursor.uint(offset_width)? as usize;
                let datatype = Datatype::parse(cursor)?;
                Ok(CompoundMember {
                    name,
                    offset,
                    datatype,
                })
            }
            other => Err(Hdf5Error::Unsupported(format!("compound datatype version {other}"))),
        }
    }
}

/// Names in older datatype messages are padded to a multiple of 8 from their own start
fn skip_name_padding(cursor: &mut ByteCursor<'_>, start: usize) -> Result<(), Hdf5Error> {
    let consumed = cursor.position() - start;
    cursor.skip(consumed.div_ceil(8) * 8 - consumed)
}

/// Where a dataset's raw data lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    Compact(Vec<u8>),
    Contiguous { address: u64 },
    /// `chunk_dims` excludes the trailing element-size dimension
    Chunked { btree_address: u64, chunk_dims: Vec<u64> },
}

impl Layout {
    pub fn parse(
        cursor: &mut ByteCursor<'_>,
        offset_size: usize,
        length_size: usize,
    ) -> Result<Self, Hdf5Error> {
        let version = cursor.u8()?;
        match version {
            1 | 2 => {
                let rank = usize::from(cursor.u8()?);
                let class = cursor.u8()?;
                cursor.skip(5)?;
                let address = if class == 0 {
                    None
                } else {
                    Some(cursor.uint(offset_size)?)
                };
                let dims = (0..rank)
                    .map(|_| cursor.u32().map(u64::from))
                    .collect::<Result<Vec<_>, _>>()?;
                match (class, address) {
                    (0, _) => {
                        let size = cursor.u32()? as usize;
                        Ok(Layout::Compact(cursor.bytes(size)?.to_vec()))
                    }
                    (1, Some(address)) => Ok(Layout::Contiguous { address }),
                    (2, Some(btree_address)) => Ok(Layout::Chunked {
                        btree_address,
                        chunk_dims: dims[..rank.saturating_sub(1)].to_vec(),
                    }),
                    _ => Err(Hdf5Error::Unsupported(format!("layout class {class}"))),
                }
            }
            3 | 4 => {
                let class = cursor.u8()?;
                match class {
                    0 => {
                        let size = usize::from(cursor.u16()?);
                        Ok(Layout::Compact(cursor.bytes(size)?.to_vec()))
                    }
                    1 => {
                        let address = cursor.uint(offset_size)?;
                        cursor.skip(length_size)?;
                        Ok(Layout::Contiguous { address })
                    }
                    2 if version == 3 => {
                        let rank = usize::from(cursor.u8()?);
                        let btree_address = cursor.uint(offset_size)?;
                        let dims = (0..rank)
                            .map(|_| cursor.u32().map(u64::from))
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(Layout::Chunked {
                            btree_address,
                            chunk_dims: dims[..rank.saturating_sub(1)].to_vec(),
                        })
                    }
                    2 => Err(Hdf5Error::Unsupported(
                        "chunk indexes other than the version 1 B-tree".to_string(),
                    )),
                    other => Err(Hdf5Error::Unsupported(format!("layout class {other}"))),
                }
            }
            other => Err(Hdf5Error::Unsupported(format!("layout version {other}"))),
        }
    }
}

/// One stage of a filter pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub id: u16,
    pub client_data: Vec<u32>,
}

pub const FILTER_DEFLATE: u16 = 1;
pub const FILTER_SHUFFLE: u16 = 2;
pub const FILTER_FLETCHER32: u16 = 3;

pub fn parse_filter_pipeline(cursor: &mut ByteCursor<'_>) -> Result<Vec<Filter>, Hdf5Error> {
    let version = cursor.u8()?;
    let count = usize::from(cursor.u8()?);
    if version == 1 {
        cursor.skip(6)?;
    } else if version != 2 {
        return Err(Hdf5Error::Unsupported(format!("filter pipeline version {version}")));
    }

    let mut filters = Vec::with_capacity(count);
    for _ in 0..count {
        let id = cursor.u16()?;
        let name_length = if version == 1 || id >= 256 {
            usize::from(cursor.u16()?)
        } else {
            0
        };
        cursor.skip(2)?; // flags
        let values = usize::from(cursor.u16()?);
        if version == 1 {
            cursor.skip(name_length.div_ceil(8) * 8)?;
        } else {
            cursor.skip(name_length)?;
        }
        let client_data = (0..values)
            .map(|_| cursor.u32())
            .collect::<Result<Vec<_>, _>>()?;
        if version == 1 && values % 2 == 1 {
            cursor.skip(4)?;
        }
        filters.push(Filter { id, client_data });
    }
    Ok(filters)
}

/// Old-style group storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTable {
    pub btree_address: u64,
    pub heap_address: u64,
}

impl SymbolTable {
    pub fn parse(cursor: &mut ByteCursor<'_>, offset_size: usize) -> Result<Self, Hdf5Error> {
        Ok(SymbolTable {
            btree_address: cursor.uint(offset_size)?,
            heap_address: cursor.uint(offset_size)?,
        })
    }
}

/// A link stored directly in a compact new-style group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    /// Object header address for hard links, `None` for soft/external links
    pub target: Option<u64>,
}

impl Link {
    pub fn parse(cursor: &mut ByteCursor<'_>, offset_size: usize) -> Result<Self, Hdf5Error> {
        let version = cursor.u8()?;
        if version != 1 {
            return Err(Hdf5Error::Unsupported(format!("link message version {version}")));
        }
        let flags = cursor.u8()?;
        let link_type = if flags & 0x08 != 0 { cursor.u8()? } else { 0 };
        if flags & 0x04 != 0 {
            cursor.skip(8)?; // creation order
        }
        if flags & 0x10 != 0 {
            cursor.skip(1)?; // charset
        }
        let name_length = cursor.uint(1 << (flags & 0x03))? as usize;
        let name = String::from_utf8_lossy(cursor.bytes(name_length)?).into_owned();
        let target = if link_type == 0 {
            Some(cursor.uint(offset_size)?)
        } else {
            None
        };
        Ok(Link { name, target })
    }
}

/// New-style group index; a defined fractal heap means dense link storage
pub fn parse_link_info_heap(
    cursor: &mut ByteCursor<'_>,
    offset_size: usize,
) -> Result<u64, Hdf5Error> {
    cursor.skip(1)?; // version
    let flags = cursor.u8()?;
    if flags & 0x01 != 0 {
        cursor.skip(8)?;
    }
    cursor.uint(offset_size)
}
