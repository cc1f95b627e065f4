//! Primitive field encodings shared by every frame (spec.md §4.9/§6): u32
//! big-endian lengths, UTF-8 strings, i64 big-endian timestamps, IEEE-754
//! 64-bit big-endian floats. `bytes::BufMut`'s numeric `put_*` methods are
//! already big-endian (its `_le` suffix is the opt-in for little-endian),
//! so the write side just calls them directly; the read side is a small
//! cursor that turns "not enough bytes left" into [`DecodeError::Truncated`]
//! instead of panicking.

use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    InvalidUtf8,
    UnknownTypeTag(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "frame payload truncated"),
            DecodeError::InvalidUtf8 => write!(f, "frame payload contained invalid UTF-8"),
            DecodeError::UnknownTypeTag(tag) => write!(f, "unknown frame type tag {tag}"),
        }
    }
}

impl std::error::Error for DecodeError {}

pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.bytes.len() - self.pos < n {
            return Err(DecodeError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
    }

    pub fn read_opt_string(&mut self) -> Result<Option<String>, DecodeError> {
        if self.read_bool()? {
            Ok(Some(self.read_string()?))
        } else {
            Ok(None)
        }
    }

    pub fn read_array<T>(
        &mut self,
        mut read_one: impl FnMut(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<Vec<T>, DecodeError> {
        let len = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            out.push(read_one(self)?);
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

pub fn write_u8(buf: &mut BytesMut, value: u8) {
    buf.put_u8(value);
}

pub fn write_u32(buf: &mut BytesMut, value: u32) {
    buf.put_u32(value);
}

pub fn write_u64(buf: &mut BytesMut, value: u64) {
    buf.put_u64(value);
}

pub fn write_i64(buf: &mut BytesMut, value: i64) {
    buf.put_i64(value);
}

pub fn write_f64(buf: &mut BytesMut, value: f64) {
    buf.put_f64(value);
}

pub fn write_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(value as u8);
}

pub fn write_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub fn write_string(buf: &mut BytesMut, value: &str) {
    write_bytes(buf, value.as_bytes());
}

pub fn write_opt_string(buf: &mut BytesMut, value: &Option<String>) {
    match value {
        Some(s) => {
            write_bool(buf, true);
            write_string(buf, s);
        },
        None => write_bool(buf, false),
    }
}

pub fn write_array<T>(buf: &mut BytesMut, items: &[T], mut write_one: impl FnMut(&mut BytesMut, &T)) {
    buf.put_u32(items.len() as u32);
    for item in items {
        write_one(buf, item);
    }
}

/// Reads `src` from the front without mutating it; callers check the
/// return value (how many bytes a complete payload needs) before
/// committing with `src.advance(..)`/`src.split_to(..)`.
pub fn peek_u32(src: &BytesMut) -> Option<u32> {
    if src.len() < 4 {
        return None;
    }
    Some(u32::from_be_bytes(src[0..4].try_into().unwrap()))
}

#[allow(dead_code)]
pub fn advance(src: &mut BytesMut, n: usize) {
    src.advance(n);
}
