//! # Payload Serialization
//!
//! Little-endian primitive writers and readers over byte buffers.
//!
//! ## Design
//!
//! - One writer is reused per participant; `reset` keeps the allocation
//! - Writes past the datagram limit fail instead of growing without bound
//! - Reads never panic: short buffers yield [`ProtocolError::Truncated`]

use super::packets::MessageHeader;
use crate::error::ProtocolError;
use bytemuck::{bytes_of, Pod};
use skirmish_shared::MAX_PACKET_SIZE;

/// Largest payload that still fits in a datagram with its header.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - MessageHeader::SIZE - RELAY_OVERHEAD;

/// Bytes reserved for the relay frame around a message.
const RELAY_OVERHEAD: usize = 8;

/// Writes a message into a reusable buffer.
pub struct PayloadWriter {
    buffer: Vec<u8>,
}

impl PayloadWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_PACKET_SIZE),
        }
    }

    /// Clears the buffer for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing was written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Written bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Mutable access for patching already written fields.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    fn reserve(&self, extra: usize) -> Result<(), ProtocolError> {
        let total = self.buffer.len() + extra;
        if total > MAX_PACKET_SIZE {
            return Err(ProtocolError::PayloadTooLarge(total));
        }
        Ok(())
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<(), ProtocolError> {
        self.reserve(1)?;
        self.buffer.push(value);
        Ok(())
    }

    /// Writes a bool as one byte.
    #[inline]
    pub fn write_bool(&mut self, value: bool) -> Result<(), ProtocolError> {
        self.write_u8(u8::from(value))
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) -> Result<(), ProtocolError> {
        self.reserve(2)?;
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) -> Result<(), ProtocolError> {
        self.reserve(4)?;
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Writes a u64 in little-endian format.
    #[inline]
    pub fn write_u64(&mut self, value: u64) -> Result<(), ProtocolError> {
        self.reserve(8)?;
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, value: &str) -> Result<(), ProtocolError> {
        let len = u16::try_from(value.len()).map_err(|_| ProtocolError::PayloadTooLarge(value.len()))?;
        self.reserve(2 + value.len())?;
        self.write_u16(len)?;
        self.buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> Result<(), ProtocolError> {
        let bytes = bytes_of(value);
        self.reserve(bytes.len())?;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Takes the written bytes, leaving the writer empty.
    #[must_use]
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.buffer, Vec::with_capacity(MAX_PACKET_SIZE))
    }
}

impl Default for PayloadWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads fields from a received buffer.
pub struct PayloadReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PayloadReader<'a> {
    /// Creates a reader over `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Bytes left.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Returns the unread tail.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.buffer[self.position.min(self.buffer.len())..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buffer[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a bool (any non-zero byte is true).
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a u16 in little-endian format.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.array().map(u16::from_le_bytes)
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.array().map(u32::from_le_bytes)
    }

    /// Reads a u64 in little-endian format.
    #[inline]
    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        self.array().map(u64::from_le_bytes)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_str(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8(field))
    }

    /// Reads a Pod type directly.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> Result<T, ProtocolError> {
        let slice = self.take(std::mem::size_of::<T>())?;
        bytemuck::try_pod_read_unaligned(slice).map_err(|_| ProtocolError::Truncated {
            needed: std::mem::size_of::<T>(),
            available: slice.len(),
        })
    }
}
