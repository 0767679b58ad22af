//! Big-endian wire primitives over an explicit buffer and cursor.
//!
//! [`PacketWriter`] and [`PacketReader`] know nothing about schemas; they implement
//! the byte-level rules every packet body is made of: fixed-width numbers, the
//! 1-or-5 byte sequence length, strings, packed booleans and enum ordinals.

use crate::codec::CodecError;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};

/// Marker byte announcing a 4-byte length.
pub const LONG_LENGTH_MARKER: u8 = 255;

/// Nested packet bodies accepted while decoding.
pub const MAX_DECODE_DEPTH: usize = 64;

/// Elements accepted in a list of a field-less type, which the input length cannot bound.
pub const MAX_EMPTY_ELEMENTS: usize = 1 << 16;

/// Re-round a decoded float to `6 - floor(log10|v|)` decimals.
pub fn round_float(v: f32) -> f32 {
    if v == 0.0 || !v.is_finite() {
        return v;
    }
    let wide = v as f64;
    let digits = 6 - wide.abs().log10().floor() as i32;
    let scale = 10f64.powi(digits);
    let rounded = (wide * scale).round() / scale;
    if rounded.is_finite() {
        rounded as f32
    } else {
        v
    }
}

#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_header(&mut self, packet_hash: i64) -> Result<(), CodecError> {
        self.write_i64(packet_hash)
    }

    pub fn write_i8(&mut self, v: i8) -> Result<(), CodecError> {
        Ok(self.buf.write_i8(v)?)
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), CodecError> {
        Ok(self.buf.write_u8(v)?)
    }

    pub fn write_i16(&mut self, v: i16) -> Result<(), CodecError> {
        Ok(self.buf.write_i16::<BigEndian>(v)?)
    }

    pub fn write_u16(&mut self, v: u16) -> Result<(), CodecError> {
        Ok(self.buf.write_u16::<BigEndian>(v)?)
    }

    pub fn write_i32(&mut self, v: i32) -> Result<(), CodecError> {
        Ok(self.buf.write_i32::<BigEndian>(v)?)
    }

    pub fn write_i64(&mut self, v: i64) -> Result<(), CodecError> {
        Ok(self.buf.write_i64::<BigEndian>(v)?)
    }

    pub fn write_f32(&mut self, v: f32) -> Result<(), CodecError> {
        Ok(self.buf.write_f32::<BigEndian>(v)?)
    }

    pub fn write_f64(&mut self, v: f64) -> Result<(), CodecError> {
        Ok(self.buf.write_f64::<BigEndian>(v)?)
    }

    /// One byte below 255, else 255 followed by a signed 32-bit length.
    pub fn write_len(&mut self, len: usize) -> Result<(), CodecError> {
        if len < LONG_LENGTH_MARKER as usize {
            return self.write_u8(len as u8);
        }
        let long = i32::try_from(len).map_err(|_| CodecError::LengthOverflow(len))?;
        self.write_u8(LONG_LENGTH_MARKER)?;
        self.write_i32(long)
    }

    pub fn write_str(&mut self, s: &str) -> Result<(), CodecError> {
        self.write_len(s.len())?;
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Bit `i % 8` of byte `i / 8`; the last byte may be partial.
    pub fn write_bits<I: IntoIterator<Item = bool>>(&mut self, bits: I) -> Result<(), CodecError> {
        let mut current = 0u8;
        let mut count = 0usize;
        for bit in bits {
            if bit {
                current |= 1 << (count % 8);
            }
            count += 1;
            if count % 8 == 0 {
                self.write_u8(current)?;
                current = 0;
            }
        }
        if count % 8 != 0 {
            self.write_u8(current)?;
        }
        Ok(())
    }

    pub fn write_bool_list(&mut self, bits: &[bool]) -> Result<(), CodecError> {
        self.write_len(bits.len())?;
        self.write_bits(bits.iter().copied())
    }

    /// 1-byte ordinal, or 2 bytes for a large enum.
    pub fn write_enum(&mut self, ordinal: u16, width: usize) -> Result<(), CodecError> {
        if width == 1 {
            let small = u8::try_from(ordinal).map_err(|_| CodecError::OrdinalTooWide(ordinal))?;
            self.write_u8(small)
        } else {
            self.write_u16(ordinal)
        }
    }
}

/// Read side; owns its cursor and a nesting counter.
#[derive(Debug)]
pub struct PacketReader<'a> {
    cursor: Cursor<&'a [u8]>,
    depth: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        PacketReader {
            cursor: Cursor::new(bytes),
            depth: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    fn eof(&self, e: io::Error) -> CodecError {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            CodecError::Truncated(self.position())
        } else {
            CodecError::Io(e)
        }
    }

    /// Enter a nested body; fails past [`MAX_DECODE_DEPTH`].
    pub fn enter(&mut self) -> Result<(), CodecError> {
        if self.depth >= MAX_DECODE_DEPTH {
            return Err(CodecError::TooDeep(MAX_DECODE_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn read_header(&mut self) -> Result<i64, CodecError> {
        self.read_i64()
    }

    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        self.cursor.read_i8().map_err(|e| self.eof(e))
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.cursor.read_u8().map_err(|e| self.eof(e))
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        self.cursor.read_i16::<BigEndian>().map_err(|e| self.eof(e))
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.cursor.read_u16::<BigEndian>().map_err(|e| self.eof(e))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.cursor.read_i32::<BigEndian>().map_err(|e| self.eof(e))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        self.cursor.read_i64::<BigEndian>().map_err(|e| self.eof(e))
    }

    /// Float re-rounded with [`round_float`].
    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        let raw = self.cursor.read_f32::<BigEndian>().map_err(|e| self.eof(e))?;
        Ok(round_float(raw))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        self.cursor.read_f64::<BigEndian>().map_err(|e| self.eof(e))
    }

    pub fn read_len(&mut self) -> Result<usize, CodecError> {
        let first = self.read_u8()?;
        if first < LONG_LENGTH_MARKER {
            return Ok(first as usize);
        }
        let long = self.read_i32()?;
        usize::try_from(long).map_err(|_| CodecError::MalformedLength(long))
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_len()?;
        if len > self.remaining() {
            return Err(CodecError::Truncated(self.position()));
        }
        let mut bytes = vec![0u8; len];
        self.cursor.read_exact(&mut bytes).map_err(|e| self.eof(e))?;
        Ok(String::from_utf8(bytes)?)
    }

    pub fn read_bits(&mut self, count: usize) -> Result<Vec<bool>, CodecError> {
        let bytes = count.div_ceil(8);
        if bytes > self.remaining() {
            return Err(CodecError::Truncated(self.position()));
        }
        let mut bits = Vec::with_capacity(count);
        let mut current = 0u8;
        for i in 0..count {
            if i % 8 == 0 {
                current = self.read_u8()?;
            }
            bits.push(current & (1 << (i % 8)) != 0);
        }
        Ok(bits)
    }

    pub fn read_bool_list(&mut self) -> Result<Vec<bool>, CodecError> {
        let len = self.read_len()?;
        self.read_bits(len)
    }

    pub fn read_enum(&mut self, width: usize) -> Result<u16, CodecError> {
        if width == 1 {
            Ok(self.read_u8()? as u16)
        } else {
            self.read_u16()
        }
    }
}
