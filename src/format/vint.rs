//! Low-level binary reading utilities for RAR 5.0 headers.

use std::io::{self, Read, Write};

use crate::{Error, Result};

/// Maximum encoded length of a vint (ten 7-bit groups cover 64 bits).
pub const MAX_VINT_LEN: usize = 10;

/// Reads a variable-length integer from a reader.
///
/// RAR 5.0 encodes integers as little-endian groups of 7 bits. The high bit
/// of every byte is a continuation flag:
///
/// - `0xxxxxxx`: last byte
/// - `1xxxxxxx`: more bytes follow
///
/// Returns the value and the number of bytes consumed.
///
/// # Errors
///
/// Returns `UnexpectedEof` on a short read and `InvalidData` when the
/// encoding exceeds [`MAX_VINT_LEN`] bytes.
pub fn read_vint<R: Read>(r: &mut R) -> io::Result<(u64, usize)> {
    let mut value = 0u64;
    for i in 0..MAX_VINT_LEN {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        value |= u64::from(byte[0] & 0x7F) << (7 * i);
        if byte[0] & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "variable-length integer too long",
    ))
}

/// Writes a variable-length integer.
///
/// This is the inverse of [`read_vint`].
pub fn write_vint<W: Write>(w: &mut W, mut value: u64) -> io::Result<usize> {
    let mut buf = [0u8; MAX_VINT_LEN];
    let mut len = 0;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf[len] = byte;
            len += 1;
            break;
        }
        buf[len] = byte | 0x80;
        len += 1;
    }
    w.write_all(&buf[..len])?;
    Ok(len)
}

/// Returns the encoded length of `value`.
pub fn vint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Cursor over a decoded header body.
///
/// Every read is bounds checked; running past the end reports a
/// [`Error::CorruptHeader`] at the absolute offset of the failing field.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader over `data`, which starts at absolute offset `base`.
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }

    /// Current position relative to the start of `data`.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute offset of the current position.
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns `true` when no bytes are left.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn short(&self, what: &str) -> Error {
        Error::corrupt(self.offset(), format!("header ends inside {}", what))
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or_else(|| self.short("byte field"))?;
        self.pos += 1;
        Ok(b)
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Reads a variable-length integer.
    pub fn read_vint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..MAX_VINT_LEN {
            let b = *self
                .data
                .get(self.pos)
                .ok_or_else(|| self.short("variable-length integer"))?;
            self.pos += 1;
            value |= u64::from(b & 0x7F) << (7 * i);
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::corrupt(
            self.offset(),
            "variable-length integer too long",
        ))
    }

    /// Reads a vint that must fit in `usize` and in the remaining bytes.
    pub fn read_length(&mut self, what: &str) -> Result<usize> {
        let len = self.read_vint()?;
        if len > self.remaining() as u64 {
            return Err(Error::corrupt(
                self.offset(),
                format!("{} length {} exceeds header", what, len),
            ));
        }
        Ok(len as usize)
    }

    /// Reads `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.short("byte string"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Reads a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Skips `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Returns a reader over the next `len` bytes and advances past them.
    pub fn sub_reader(&mut self, len: usize) -> Result<ByteReader<'a>> {
        let base = self.offset();
        let bytes = self.read_bytes(len)?;
        Ok(ByteReader::new(bytes, base))
    }
}
