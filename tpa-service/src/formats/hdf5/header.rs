//! File access and superblock

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::cursor::ByteCursor;
use super::Hdf5Error;

pub const SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

/// Positioned reads relative to the HDF5 base address
///
/// The base is where the signature was found, so files carrying a user block
/// (MATLAB v7.3 reserves 512 bytes) resolve the same way as plain files.
pub struct Source {
    file: File,
    len: u64,
    base: u64,
}

impl Source {
    pub fn open(path: &Path) -> Result<(Self, Superblock), Hdf5Error> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut source = Source { file, len, base: 0 };

        let base = source.find_signature()?;
        source.base = base;
        let superblock = Superblock::parse(&source)?;
        Ok((source, superblock))
    }

    /// Signature sits at 0, 512, 1024, 2048, ...
    fn find_signature(&self) -> Result<u64, Hdf5Error> {
        let mut offset = 0u64;
        while offset + SIGNATURE.len() as u64 <= self.len {
            let candidate = self.read_absolute(offset, SIGNATURE.len())?;
            if candidate == SIGNATURE {
                return Ok(offset);
            }
            offset = if offset == 0 { 512 } else { offset * 2 };
        }
        Err(Hdf5Error::NotHdf5)
    }

    fn read_absolute(&self, offset: u64, n: usize) -> Result<Vec<u8>, Hdf5Error> {
        let end = offset
            .checked_add(n as u64)
            .filter(|end| *end <= self.len)
            .ok_or(Hdf5Error::Truncated("address beyond end of file"))?;
        let mut buf = vec![0u8; (end - offset) as usize];
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Exactly `n` bytes at a file address
    pub fn read_at(&self, address: u64, n: usize) -> Result<Vec<u8>, Hdf5Error> {
        let offset = self
            .base
            .checked_add(address)
            .ok_or(Hdf5Error::Truncated("address overflow"))?;
        self.read_absolute(offset, n)
    }

    /// Up to `n` bytes at a file address, fewer near end of file
    pub fn read_up_to(&self, address: u64, n: usize) -> Result<Vec<u8>, Hdf5Error> {
        let offset = self
            .base
            .checked_add(address)
            .ok_or(Hdf5Error::Truncated("address overflow"))?;
        let available = self.len.saturating_sub(offset).min(n as u64) as usize;
        self.read_absolute(offset, available)
    }
}

/// Fields of the superblock needed to navigate the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub version: u8,
    /// Size of file addresses in bytes
    pub offset_size: usize,
    /// Size of lengths in bytes
    pub length_size: usize,
    pub root_object_header: u64,
}

impl Superblock {
    fn parse(source: &Source) -> Result<Self, Hdf5Error> {
        let raw = source.read_up_to(0, 256)?;
        let mut cursor = ByteCursor::new(&raw);
        cursor.skip(SIGNATURE.len())?;
        let version = cursor.u8()?;

        match version {
            0 | 1 => {
                cursor.skip(3)?; // free-space, root symbol table, reserved
                cursor.skip(1)?; // shared header message format
                let offset_size = usize::from(cursor.u8()?);
                let length_size = usize::from(cursor.u8()?);
                cursor.skip(1)?;
                check_sizes(offset_size, length_size)?;
                cursor.skip(4)?; // group leaf / internal node K
                cursor.skip(4)?; // consistency flags
                if version == 1 {
                    cursor.skip(4)?; // indexed storage K + reserved
                }
                // base, free-space info, end of file, driver info
                cursor.skip(4 * offset_size)?;
                // root group symbol table entry: link name offset, then header address
                cursor.skip(offset_size)?;
                let root_object_header = cursor.uint(offset_size)?;
                Ok(Superblock {
                    version,
                    offset_size,
                    length_size,
                    root_object_header,
                })
            }
            2 | 3 => {
                let offset_size = usize::from(cursor.u8()?);
                let length_size = usize::from(cursor.u8()?);
                check_sizes(offset_size, length_size)?;
                cursor.skip(1)?; // consistency flags
                // base, superblock extension, end of file
                cursor.skip(3 * offset_size)?;
                let root_object_header = cursor.uint(offset_size)?;
                Ok(Superblock {
                    version,
                    offset_size,
                    length_size,
                    root_object_header,
                })
            }
            other => Err(Hdf5Error::Unsupported(format!("superblock version {other}"))),
        }
    }

    /// All-ones address meaning "not allocated"
    pub fn is_undefined(&self, address: u64) -> bool {
        let bits = self.offset_size * 8;
        let undefined = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
        address == undefined
    }
}

fn check_sizes(offset_size: usize, length_size: usize) -> Result<(), Hdf5Error> {
    let valid = |size: usize| matches!(size, 2 | 4 | 8);
    if valid(offset_size) && valid(length_size) {
        Ok(())
    } else {
        Err(Hdf5Error::Unsupported(format!(
            "offset size {offset_size} / length size {length_size}"
        )))
    }
}
