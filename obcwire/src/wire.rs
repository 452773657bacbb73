//! Tag framing, the bounds-checked `Reader` and the forking `Writer`.
//!
//! ```text
//!  tag = (field_number << 3) | wire_type
//! ┌────────────┬─────────────────────────────────────────────┐
//! │ tag varint │ VARINT:  value varint                       │
//! │            │ FIXED64: 8 bytes LE                         │
//! │            │ LDELIM:  length varint | length bytes       │
//! │            │ FIXED32: 4 bytes LE                         │
//! └────────────┴─────────────────────────────────────────────┘
//! ```

use log::trace;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::config::CodecConfig;
use crate::error::{Result, WireError};
use crate::varint::{self, zigzag_decode_32, zigzag_decode_64, zigzag_encode_32, zigzag_encode_64};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

/// Deepest group nesting `Reader::skip` follows.
pub const MAX_GROUP_DEPTH: usize = 64;

pub const fn make_tag(field_number: u32, wire_type: WireType) -> u32 {
    (field_number << 3) | wire_type as u32
}

pub const fn tag_field_number(tag: u32) -> u32 {
    tag >> 3
}

pub fn tag_wire_type(tag: u32) -> Result<WireType> {
    let raw = (tag & 7) as u8;
    WireType::try_from(raw).map_err(|_| WireError::InvalidWireType(raw))
}

/// Sequential reader over an in-memory message buffer.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    config: CodecConfig,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_config(buf, CodecConfig::default())
    }

    pub fn with_config(buf: &'a [u8], config: CodecConfig) -> Self {
        Reader { buf, pos: 0, config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(WireError::TruncatedMessage {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, used) = varint::decode_varint(&self.buf[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    pub fn read_tag(&mut self) -> Result<u32> {
        let raw = self.read_varint()?;
        u32::try_from(raw).map_err(|_| WireError::InvalidTag(raw))
    }

    /// Read a length prefix and return the absolute end offset it implies.
    pub fn read_length(&mut self) -> Result<usize> {
        let len = self.read_varint()? as usize;
        if len > self.remaining() {
            return Err(WireError::TruncatedMessage {
                needed: len,
                remaining: self.remaining(),
            });
        }
        Ok(self.pos + len)
    }

    pub fn read_uint32(&mut self) -> Result<u32> {
        Ok(self.read_varint()? as u32)
    }

    pub fn read_uint64(&mut self) -> Result<u64> {
        let v = self.read_varint()?;
        self.config.check_u64(v)
    }

    pub fn read_int32(&mut self) -> Result<i32> {
        Ok(self.read_varint()? as i32)
    }

    pub fn read_int64(&mut self) -> Result<i64> {
        let v = self.read_varint()? as i64;
        self.config.check_i64(v)
    }

    pub fn read_sint32(&mut self) -> Result<i32> {
        Ok(zigzag_decode_32(self.read_varint()? as u32))
    }

    pub fn read_sint64(&mut self) -> Result<i64> {
        let v = zigzag_decode_64(self.read_varint()?);
        self.config.check_i64(v)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_varint()? != 0)
    }

    pub fn read_double(&mut self) -> Result<f64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(raw))
    }

    pub fn read_fixed32(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let end = self.read_length()?;
        self.take(end - self.pos)
    }

    pub fn read_string(&mut self) -> Result<&'a str> {
        core::str::from_utf8(self.read_bytes()?).map_err(|_| WireError::InvalidUtf8)
    }

    /// Discard the value of field `field_number`, framed as `wire_type`.
    pub fn skip(&mut self, field_number: u32, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.take(8)?;
            }
            WireType::LengthDelimited => {
                self.read_bytes()?;
            }
            WireType::Fixed32 => {
                self.take(4)?;
            }
            WireType::StartGroup => self.skip_group(field_number)?,
            WireType::EndGroup => {}
        }
        trace!("skipped {:?} value, now at {}", wire_type, self.pos);
        Ok(())
    }

    /// Skip to the END_GROUP closing `field_number`. Nested groups are
    /// tracked on an explicit stack.
    fn skip_group(&mut self, field_number: u32) -> Result<()> {
        let mut open = vec![field_number];
        while let Some(&current) = open.last() {
            let tag = self.read_tag()?;
            let number = tag_field_number(tag);
            match tag_wire_type(tag)? {
                WireType::StartGroup if open.len() >= MAX_GROUP_DEPTH => {
                    return Err(WireError::GroupTooDeep(MAX_GROUP_DEPTH));
                }
                WireType::StartGroup => open.push(number),
                WireType::EndGroup if number == current => {
                    open.pop();
                }
                WireType::EndGroup => return Err(WireError::InvalidTag(u64::from(tag))),
                other => self.skip(number, other)?,
            }
        }
        Ok(())
    }
}

/// Append-only encoder with nested length-delimited regions.
///
/// `fork` opens a region, `ldelim` closes the innermost one and prefixes it
/// with its byte length.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
    forks: Vec<usize>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Vec<u8> {
        debug_assert!(self.forks.is_empty(), "unclosed fork in writer");
        self.buf
    }

    pub fn varint(&mut self, v: u64) -> &mut Self {
        varint::encode_varint(v, &mut self.buf);
        self
    }

    pub fn tag(&mut self, field_number: u32, wire_type: WireType) -> &mut Self {
        self.varint(u64::from(make_tag(field_number, wire_type)))
    }

    pub fn uint32(&mut self, v: u32) -> &mut Self {
        self.varint(u64::from(v))
    }

    pub fn uint64(&mut self, v: u64) -> &mut Self {
        self.varint(v)
    }

    /// Negative values are sign-extended to ten bytes.
    pub fn int32(&mut self, v: i32) -> &mut Self {
        self.varint(i64::from(v) as u64)
    }

    pub fn int64(&mut self, v: i64) -> &mut Self {
        self.varint(v as u64)
    }

    pub fn sint32(&mut self, v: i32) -> &mut Self {
        self.varint(u64::from(zigzag_encode_32(v)))
    }

    pub fn sint64(&mut self, v: i64) -> &mut Self {
        self.varint(zigzag_encode_64(v))
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.varint(u64::from(v))
    }

    pub fn double(&mut self, v: f64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn fixed32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.varint(v.len() as u64);
        self.buf.extend_from_slice(v);
        self
    }

    pub fn string(&mut self, v: &str) -> &mut Self {
        self.bytes(v.as_bytes())
    }

    pub fn fork(&mut self) -> &mut Self {
        self.forks.push(self.buf.len());
        self
    }

    pub fn ldelim(&mut self) -> &mut Self {
        let start = match self.forks.pop() {
            Some(start) => start,
            None => {
                debug_assert!(false, "ldelim without a matching fork");
                return self;
            }
        };
        let region = self.buf.len() - start;
        let mut prefix = Vec::with_capacity(varint::MAX_VARINT_LEN);
        varint::encode_varint(region as u64, &mut prefix);
        self.buf.extend_from_slice(&prefix);
        // move the prefix in front of the region it measures
        self.buf[start..].rotate_right(prefix.len());
        self
    }
}
