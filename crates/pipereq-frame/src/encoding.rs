//! Compact binary primitives shared by both message structs.
//!
//! ```text
//! varint   < 0xfd        -> 1 byte
//!          <= 0xffff     -> 0xfd + u16 LE
//!          <= 0xffffffff -> 0xfe + u32 LE
//!          otherwise     -> 0xff + u64 LE
//! string   varint(len) + utf-8 bytes
//! buffer   varint(len) + raw bytes
//! json     string holding JSON text
//! uint16   2 bytes LE
//! ```

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// Header name -> value mapping carried by responses.
pub type Headers = BTreeMap<String, String>;

pub(crate) fn put_varint(dst: &mut BytesMut, n: u64) {
    if n < 0xfd {
        dst.put_u8(n as u8);
    } else if n <= u64::from(u16::MAX) {
        dst.put_u8(0xfd);
        dst.put_u16_le(n as u16);
    } else if n <= u64::from(u32::MAX) {
        dst.put_u8(0xfe);
        dst.put_u32_le(n as u32);
    } else {
        dst.put_u8(0xff);
        dst.put_u64_le(n);
    }
}

pub(crate) fn put_buffer(dst: &mut BytesMut, bytes: &[u8]) {
    put_varint(dst, bytes.len() as u64);
    dst.put_slice(bytes);
}

pub(crate) fn put_string(dst: &mut BytesMut, s: &str) {
    put_buffer(dst, s.as_bytes());
}

pub(crate) fn put_headers(dst: &mut BytesMut, headers: &Headers) {
    // A map of strings always serializes.
    let json = serde_json::to_string(headers).unwrap_or_else(|_| "{}".to_string());
    put_string(dst, &json);
}

pub(crate) fn put_uint16(dst: &mut BytesMut, n: u16) {
    dst.put_u16_le(n);
}

/// Read cursor over one encoded struct.
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], CodecError> {
        let remaining = self.buf.len() - self.pos;
        if n > remaining {
            return Err(CodecError::Truncated {
                field,
                needed: n,
                remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn varint(&mut self, field: &'static str) -> Result<u64, CodecError> {
        let tag = self.take(1, field)?[0];
        let value = match tag {
            0xfd => u64::from(self.uint16(field)?),
            0xfe => {
                let raw = self.take(4, field)?;
                u64::from(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            0xff => {
                let raw = self.take(8, field)?;
                let mut word = [0u8; 8];
                word.copy_from_slice(raw);
                u64::from_le_bytes(word)
            }
            small => u64::from(small),
        };
        Ok(value)
    }

    pub(crate) fn buffer(&mut self, field: &'static str) -> Result<Bytes, CodecError> {
        let len = self.varint(field)?;
        let len = usize::try_from(len).map_err(|_| CodecError::LengthOverflow(len))?;
        Ok(Bytes::copy_from_slice(self.take(len, field)?))
    }

    pub(crate) fn string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let raw = self.buffer(field)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8 { field })
    }

    pub(crate) fn headers(&mut self, field: &'static str) -> Result<Headers, CodecError> {
        let json = self.string(field)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub(crate) fn uint16(&mut self, field: &'static str) -> Result<u16, CodecError> {
        let raw = self.take(2, field)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    }

    /// Require that every byte was consumed.
    pub(crate) fn finish(self) -> Result<(), CodecError> {
        match self.buf.len() - self.pos {
            0 => Ok(()),
            extra => Err(CodecError::TrailingBytes(extra)),
        }
    }
}
