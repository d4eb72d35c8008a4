//! Big-endian integer and length-prefixed string primitives for section headers.

use crate::error::{Error, Result};

/// Encoded size of a length-prefixed string.
pub fn string_size(value: &str) -> usize { 2 + value.len() }

#[derive(Default)]
pub struct SectionWriter {
    buffer: Vec<u8>,
}
impl SectionWriter {
    pub fn new() -> Self { SectionWriter::default() }

    pub fn with_capacity(capacity: usize) -> Self {
        SectionWriter {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize { self.buffer.len() }

    pub fn is_empty(&self) -> bool { self.buffer.is_empty() }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self { self.bytes(&value.to_be_bytes()) }

    pub fn u32(&mut self, value: u32) -> &mut Self { self.bytes(&value.to_be_bytes()) }

    /// Writes a 2-byte length followed by the raw UTF-8 bytes, nothing more for an empty string.
    pub fn string(&mut self, value: &str) -> Result<&mut Self> {
        let len = u16::try_from(value.len()).map_err(|_| {
            Error::NotValid(format!(
                "string of {} bytes does not fit a section header",
                value.len()
            ))
        })?;
        self.u16(len);
        Ok(self.bytes(value.as_bytes()))
    }

    pub fn into_inner(self) -> Vec<u8> { self.buffer }
}

pub struct SectionReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}
impl<'a> SectionReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self { SectionReader { buffer, offset: 0 } }

    pub fn at(buffer: &'a [u8], offset: usize) -> Self { SectionReader { buffer, offset } }

    pub fn offset(&self) -> usize { self.offset }

    pub fn remaining(&self) -> usize { self.buffer.len().saturating_sub(self.offset) }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.buffer.len())
            .ok_or_else(|| {
                Error::Truncated(format!(
                    "section ends at {} bytes, reading {} bytes at offset {}",
                    self.buffer.len(),
                    len,
                    self.offset
                ))
            })?;
        let bytes = &self.buffer[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    pub fn u16(&mut self) -> Result<u16> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn string(&mut self, field: &'static str) -> Result<String> {
        let len = self.u16()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = self.bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| Error::InvalidString(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_big_endian_and_prefixed_strings() {
        let mut writer = SectionWriter::new();
        writer.u32(0x0a0b_0c0d).u16(0x0102);
        writer.string("/app").unwrap();
        writer.string("").unwrap();
        let bytes = writer.into_inner();
        assert_eq!(
            bytes,
            [0x0a, 0x0b, 0x0c, 0x0d, 0x01, 0x02, 0, 4, b'/', b'a', b'p', b'p', 0, 0]
        );
    }

    #[test]
    fn reads_back_what_was_written() {
        let mut writer = SectionWriter::new();
        writer.u16(7);
        writer.string("zip").unwrap().string("").unwrap().string("μ").unwrap();
        let bytes = writer.into_inner();
        let mut reader = SectionReader::new(&bytes);
        assert_eq!(reader.u16().unwrap(), 7);
        assert_eq!(reader.string("type").unwrap(), "zip");
        assert_eq!(reader.string("mapping").unwrap(), "");
        assert_eq!(reader.string("index").unwrap(), "μ");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn reading_past_the_end_is_an_error() {
        let bytes = [0, 9, b'a', b'b'];
        let mut reader = SectionReader::new(&bytes);
        assert!(matches!(reader.string("name"), Err(Error::Truncated(_))));
        let mut reader = SectionReader::at(&bytes, 3);
        assert!(matches!(reader.u32(), Err(Error::Truncated(_))));
    }

    #[test]
    fn rejects_invalid_utf8() {
        let bytes = [0, 2, 0xff, 0xfe];
        let mut reader = SectionReader::new(&bytes);
        assert!(matches!(reader.string("name"), Err(Error::InvalidString("name"))));
    }

    #[test]
    fn rejects_oversized_strings() {
        let value = "x".repeat(u16::MAX as usize + 1);
        let mut writer = SectionWriter::new();
        assert!(matches!(writer.string(&value), Err(Error::NotValid(_))));
        assert!(writer.is_empty());
    }
}
