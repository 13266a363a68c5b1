//! Variable-length integer packing used by game messages.
//!
//! First byte: continue bit (0x80), sign bit (0x40), 6 data bits. Each following
//! byte: continue bit and 7 data bits. Negative values are stored inverted.

use bytes::{BufMut, Bytes, BytesMut};

/// Longest encoding of an i32
const MAX_INT_BYTES: usize = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PackError {
    #[error("unexpected end of message at byte {0}")]
    Truncated(usize),

    #[error("integer encoding longer than {MAX_INT_BYTES} bytes at byte {0}")]
    Overlong(usize),

    #[error("string at byte {0} is not valid utf-8")]
    InvalidString(usize),
}

#[derive(Debug, Default)]
pub struct Packer {
    buf: BytesMut,
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_int(&mut self, value: i32) -> &mut Self {
        let mut first = ((value >> 25) & 0x40) as u8;
        // fold negatives onto their bitwise complement
        let mut rest = (value ^ (value >> 31)) as u32;

        first |= (rest & 0x3f) as u8;
        rest >>= 6;
        if rest != 0 {
            first |= 0x80;
        }
        self.buf.put_u8(first);

        while rest != 0 {
            let mut byte = (rest & 0x7f) as u8;
            rest >>= 7;
            if rest != 0 {
                byte |= 0x80;
            }
            self.buf.put_u8(byte);
        }
        self
    }

    /// Zero-terminated string; embedded zero bytes are dropped
    pub fn add_string(&mut self, value: &str) -> &mut Self {
        self.buf.extend(value.bytes().filter(|&b| b != 0));
        self.buf.put_u8(0);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

pub struct Unpacker<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn get_int(&mut self) -> Result<i32, PackError> {
        let start = self.pos;
        let first = *self.data.get(self.pos).ok_or(PackError::Truncated(start))?;
        self.pos += 1;

        let sign = i32::from((first >> 6) & 1);
        let mut value = u32::from(first & 0x3f);
        let mut more = first & 0x80 != 0;
        let mut shift = 6;

        while more {
            if self.pos - start >= MAX_INT_BYTES {
                return Err(PackError::Overlong(start));
            }
            let byte = *self.data.get(self.pos).ok_or(PackError::Truncated(self.pos))?;
            self.pos += 1;
            value |= u32::from(byte & 0x7f) << shift;
            shift += 7;
            more = byte & 0x80 != 0;
        }

        Ok((value as i32) ^ -sign)
    }

    pub fn get_string(&mut self) -> Result<&'a str, PackError> {
        let start = self.pos;
        let rest = &self.data[start.min(self.data.len())..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(PackError::Truncated(self.data.len()))?;
        self.pos = start + end + 1;
        std::str::from_utf8(&rest[..end]).map_err(|_| PackError::InvalidString(start))
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }
}
