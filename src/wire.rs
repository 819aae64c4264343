//! Bounds-checked readers for the ROS1 message serialization format.
//!
//! ROS1 serializes every field little-endian with no padding; strings and
//! variable arrays carry a `uint32` length prefix.

use crate::error::DecodeError;

pub struct Cursor<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self { payload, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.payload.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.payload.len());
        match end {
            Some(end) => {
                let bytes = &self.payload[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(DecodeError::Truncated {
                field,
                offset: self.pos,
                needed: n,
                len: self.payload.len(),
            }),
        }
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, field)?[0])
    }

    pub fn read_bool(&mut self, field: &'static str) -> Result<bool, DecodeError> {
        Ok(self.read_u8(field)? != 0)
    }

    pub fn read_u32_le(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        let b = self.take(4, field)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f32_le(&mut self, field: &'static str) -> Result<f32, DecodeError> {
        let b = self.take(4, field)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f64_le(&mut self, field: &'static str) -> Result<f64, DecodeError> {
        let b = self.take(8, field)?;
        Ok(f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// `float32[]`: length prefix followed by the values.
    pub fn read_f32_array(&mut self, field: &'static str) -> Result<Vec<f32>, DecodeError> {
        let len = self.read_u32_le(field)? as usize;
        let bytes = self.take(len.checked_mul(4).unwrap_or(usize::MAX), field)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    pub fn skip(&mut self, n: usize, field: &'static str) -> Result<(), DecodeError> {
        self.take(n, field).map(|_| ())
    }

    pub fn read_string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.read_u32_le(field)? as usize;
        let bytes = self.take(len, field)?;
        Ok(String::from_utf8_lossy(bytes).to_string())
    }

    /// `uint8[]`: length prefix followed by the raw bytes, borrowed.
    pub fn read_byte_array(&mut self, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u32_le(field)? as usize;
        self.take(len, field)
    }

    /// `std_msgs/Header`: seq, stamp (secs, nsecs), frame_id.
    pub fn read_header(&mut self) -> Result<Header, DecodeError> {
        let seq = self.read_u32_le("header.seq")?;
        let secs = self.read_u32_le("header.stamp.secs")?;
        let nsecs = self.read_u32_le("header.stamp.nsecs")?;
        let frame_id = self.read_string("header.frame_id")?;
        Ok(Header {
            seq,
            stamp_ns: secs as u64 * 1_000_000_000 + nsecs as u64,
            frame_id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub seq: u32,
    pub stamp_ns: u64,
    pub frame_id: String,
}

/// Little-endian `f32` at `off` in `data`, or `None` past the end.
#[inline]
pub fn f32_le_at(data: &[u8], off: usize) -> Option<f32> {
    let bytes = data.get(off..off.checked_add(4)?)?;
    Some(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
