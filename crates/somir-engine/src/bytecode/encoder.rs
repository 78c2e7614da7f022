//! Little-endian byte writer and reader for the module format.

use thiserror::Error;

/// Errors produced while reading a serialized module.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The input ended inside a field.
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),
    /// A string constant held invalid UTF-8.
    #[error("invalid UTF-8 in string constant")]
    InvalidUtf8,
}

/// Append-only little-endian byte buffer.
#[derive(Debug, Default)]
pub struct BytecodeWriter {
    buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// An empty writer.
    pub fn new() -> BytecodeWriter {
        BytecodeWriter::default()
    }

    /// Append a byte.
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Append an unsigned 16-bit value.
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a signed 16-bit value.
    pub fn emit_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Append an unsigned 32-bit value.
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a signed 32-bit value.
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a 64-bit float.
    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Append raw bytes.
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Append a u32-length-prefixed UTF-8 string.
    pub fn emit_string(&mut self, text: &str) {
        self.emit_u32(text.len() as u32);
        self.buffer.extend_from_slice(text.as_bytes());
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the writer, yielding its buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Cursor over a serialized module.
#[derive(Debug)]
pub struct BytecodeReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BytecodeReader<'a> {
    /// A reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> BytecodeReader<'a> {
        BytecodeReader { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        if self.pos + N > self.data.len() {
            return Err(DecodeError::UnexpectedEof(self.pos));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read an unsigned 16-bit value.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    /// Read a signed 16-bit value.
    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    /// Read an unsigned 32-bit value.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Read a signed 32-bit value.
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    /// Read a 64-bit float.
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    /// Read `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + len > self.data.len() {
            return Err(DecodeError::UnexpectedEof(self.pos));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a u32-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_round_trip() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u8(0xAB);
        writer.emit_u16(0x1234);
        writer.emit_i16(-2);
        writer.emit_u32(0xDEAD_BEEF);
        writer.emit_i32(-40_000);
        writer.emit_f64(2.5);
        writer.emit_string("héllo");

        let bytes = writer.into_bytes();
        let mut reader = BytecodeReader::new(&bytes);
        assert_eq!(reader.read_u8(), Ok(0xAB));
        assert_eq!(reader.read_u16(), Ok(0x1234));
        assert_eq!(reader.read_i16(), Ok(-2));
        assert_eq!(reader.read_u32(), Ok(0xDEAD_BEEF));
        assert_eq!(reader.read_i32(), Ok(-40_000));
        assert_eq!(reader.read_f64(), Ok(2.5));
        assert_eq!(reader.read_string(), Ok("héllo".to_owned()));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u16(0x0102);
        assert_eq!(writer.into_bytes(), vec![0x02, 0x01]);
    }

    #[test]
    fn test_eof_is_reported() {
        let mut reader = BytecodeReader::new(&[0x01]);
        assert_eq!(reader.read_u8(), Ok(0x01));
        assert_eq!(reader.read_u16(), Err(DecodeError::UnexpectedEof(1)));
    }

    #[test]
    fn test_invalid_utf8_is_reported() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u32(2);
        writer.emit_bytes(&[0xFF, 0xFE]);
        let bytes = writer.into_bytes();
        let mut reader = BytecodeReader::new(&bytes);
        assert_eq!(reader.read_string(), Err(DecodeError::InvalidUtf8));
    }
}
