//! Little-endian byte cursor for HDF5 structures

use super::Hdf5Error;

/// Sequential reader over an in-memory block
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, pos: usize) -> Result<(), Hdf5Error> {
        if pos > self.buf.len() {
            return Err(Hdf5Error::Truncated("seek past end of block"));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), Hdf5Error> {
        self.bytes(n).map(|_| ())
    }

    /// Advance to the next multiple of `alignment` (relative to block start)
    pub fn align(&mut self, alignment: usize) -> Result<(), Hdf5Error> {
        let rem = self.pos % alignment;
        if rem != 0 {
            self.skip(alignment - rem)?;
        }
        Ok(())
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], Hdf5Error> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(Hdf5Error::Truncated("unexpected end of block"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, Hdf5Error> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, Hdf5Error> {
        self.uint(2).map(|v| v as u16)
    }

    pub fn u32(&mut self) -> Result<u32, Hdf5Error> {
        self.uint(4).map(|v| v as u32)
    }

    pub fn u64(&mut self) -> Result<u64, Hdf5Error> {
        self.uint(8)
    }

    /// Unsigned little-endian integer of 1..=8 bytes
    pub fn uint(&mut self, size: usize) -> Result<u64, Hdf5Error> {
        if size == 0 || size > 8 {
            return Err(Hdf5Error::Unsupported(format!("{size}-byte integer field")));
        }
        let raw = self.bytes(size)?;
        Ok(raw
            .iter()
            .rev()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
    }

    /// Expect a 4-byte structure signature
    pub fn signature(&mut self, expected: &[u8; 4], what: &'static str) -> Result<(), Hdf5Error> {
        if self.bytes(4)? != expected {
            return Err(Hdf5Error::Corrupt(format!("missing {what} signature")));
        }
        Ok(())
    }

    /// NUL-terminated string; consumes the terminator
    pub fn c_string(&mut self) -> Result<String, Hdf5Error> {
        let rest = &self.buf[self.pos.min(self.buf.len())..];
        let len = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or(Hdf5Error::Truncated("unterminated string"))?;
        let text = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_fields() {
        let data = [0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xff];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.u8().unwrap(), 1);
        assert_eq!(cursor.u16().unwrap(), 0x1234);
        assert_eq!(cursor.u32().unwrap(), 0x1234_5678);
        assert_eq!(cursor.remaining(), 1);
        assert!(cursor.u16().is_err());
    }

    #[test]
    fn test_variable_width_and_alignment() {
        let data = [0xaa, 0xbb, 0xcc, 0, 0, 0, 0, 0, 0x10, 0];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.uint(3).unwrap(), 0xccbbaa);
        cursor.align(8).unwrap();
        assert_eq!(cursor.position(), 8);
        assert_eq!(cursor.uint(2).unwrap(), 0x10);
    }

    #[test]
    fn test_c_string() {
        let data = b"abc\0def\0";
        let mut cursor = ByteCursor::new(data);
        assert_eq!(cursor.c_string().unwrap(), "abc");
        assert_eq!(cursor.c_string().unwrap(), "def");
        assert!(cursor.c_string().is_err());
    }
}
