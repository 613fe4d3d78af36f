//! Fixed offset/width field descriptors
//!
//! Headers are read through these descriptors instead of a native struct
//! overlay, so the result does not depend on how a given platform's C headers
//! lay out (or name) the fields.

use pktbridge_core::{Error, Result};

/// A 16-bit header field at a fixed byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field16 {
    /// Byte offset from the start of the header
    pub offset: usize,
}

/// A 32-bit header field at a fixed byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field32 {
    /// Byte offset from the start of the header
    pub offset: usize,
}

impl Field16 {
    /// Field width in bytes
    pub const WIDTH: usize = 2;

    pub const fn at(offset: usize) -> Self {
        Self { offset }
    }

    /// First byte past the field
    pub const fn end(self) -> usize {
        self.offset + Self::WIDTH
    }

    /// The field bytes exactly as stored (network order)
    ///
    /// Callers guarantee `header.len() >= self.end()`.
    #[inline]
    pub fn bytes(self, header: &[u8]) -> [u8; 2] {
        [header[self.offset], header[self.offset + 1]]
    }

    /// The stored bytes reinterpreted in native memory order, no conversion
    #[inline]
    pub fn raw(self, header: &[u8]) -> u16 {
        u16::from_ne_bytes(self.bytes(header))
    }

    /// The field value in host byte order
    #[inline]
    pub fn host(self, header: &[u8]) -> u16 {
        u16::from_be(self.raw(header))
    }
}

impl Field32 {
    /// Field width in bytes
    pub const WIDTH: usize = 4;

    pub const fn at(offset: usize) -> Self {
        Self { offset }
    }

    /// First byte past the field
    pub const fn end(self) -> usize {
        self.offset + Self::WIDTH
    }

    /// The field bytes exactly as stored (network order)
    ///
    /// Callers guarantee `header.len() >= self.end()`.
    #[inline]
    pub fn bytes(self, header: &[u8]) -> [u8; 4] {
        let o = self.offset;
        [header[o], header[o + 1], header[o + 2], header[o + 3]]
    }

    /// The stored bytes reinterpreted in native memory order, no conversion
    #[inline]
    pub fn raw(self, header: &[u8]) -> u32 {
        u32::from_ne_bytes(self.bytes(header))
    }

    /// The field value in host byte order
    #[inline]
    pub fn host(self, header: &[u8]) -> u32 {
        u32::from_be(self.raw(header))
    }
}

/// Check that `buffer` holds `len` bytes starting at `offset`
///
/// Returns the sub-slice starting at `offset` on success.
pub(crate) fn window(buffer: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let needed = offset.checked_add(len).unwrap_or(usize::MAX);
    if buffer.len() < needed {
        return Err(Error::bounds(needed, buffer.len()));
    }
    Ok(&buffer[offset..])
}
