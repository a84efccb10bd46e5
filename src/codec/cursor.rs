// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Bounds-checked byte cursors
//!
//! Station protocols mix little-endian console frames with big-endian
//! network frames, so the reader exposes both explicitly. Every accessor
//! checks the remaining length and fails with
//! [`CodecError::UnexpectedEnd`] instead of panicking.

use super::packed::{decode_packed, encode_packed};
use super::CodecError;
use crate::records::{is_null, ARCHIVE_VALUE_NULL};

/// Sentinel carried on the wire for a null value. The in-memory null
/// (-100000) is outside the packed float range.
pub const WIRE_VALUE_NULL: f32 = -32767.0;

/// Sequential reader over a borrowed byte slice
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEnd {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), CodecError> {
        self.take(n).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16_le(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn i16_le(&mut self) -> Result<i16, CodecError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub fn u16_be(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u32_be(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn i32_be(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    /// Read a network-order packed float.
    pub fn packed_f32(&mut self) -> Result<f32, CodecError> {
        Ok(decode_packed(self.u32_be()?))
    }

    /// Packed float where the wire sentinel maps back to the null value.
    pub fn nullable_f32(&mut self) -> Result<f32, CodecError> {
        let value = self.packed_f32()?;
        Ok(if value <= WIRE_VALUE_NULL {
            ARCHIVE_VALUE_NULL
        } else {
            value
        })
    }
}

/// Growable writer producing wire bytes
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn put_u16_le(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_i16_le(&mut self, value: i16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_u16_be(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_u32_be(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_i32_be(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_packed_f32(&mut self, value: f32) -> &mut Self {
        self.put_u32_be(encode_packed(value))
    }

    /// Packed float with null values sent as [`WIRE_VALUE_NULL`].
    pub fn put_nullable_f32(&mut self, value: f32) -> &mut Self {
        if is_null(value) {
            self.put_packed_f32(WIRE_VALUE_NULL)
        } else {
            self.put_packed_f32(value)
        }
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn put_zeros(&mut self, count: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + count, 0);
        self
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_mixed_endianness() {
        let bytes = [0x34, 0x12, 0x12, 0x34, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x01];
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.u16_le().unwrap(), 0x1234);
        assert_eq!(reader.u16_be().unwrap(), 0x1234);
        assert_eq!(reader.i16_le().unwrap(), -1);
        assert_eq!(reader.u32_be().unwrap(), 1);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_reader_reports_short_buffer() {
        let bytes = [0x01, 0x02, 0x03];
        let mut reader = ByteReader::new(&bytes);
        reader.u8().unwrap();
        let err = reader.u32_be().unwrap_err();
        assert_eq!(
            err,
            CodecError::UnexpectedEnd {
                needed: 4,
                remaining: 2
            }
        );
        // A failed read does not consume anything
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_writer_chaining() {
        let mut writer = ByteWriter::new();
        writer.put_u16_le(0x0102).put_u16_be(0x0102).put_zeros(2);
        assert_eq!(writer.as_slice(), &[0x02, 0x01, 0x01, 0x02, 0x00, 0x00]);
    }
}
