//! Bounds-checked reader over a firmware image buffer.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("read of {len} bytes at {offset:#x} exceeds buffer size {size:#x}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
}

/// Round `offset` up to the next multiple of `align` (a power of two).
#[inline]
pub fn align_up(offset: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// Read cursor over a borrowed byte buffer.
///
/// Moving the cursor never fails; the new position is only validated
/// against the buffer length by the next [`ByteCursor::peek`].
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn advance(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n);
    }

    pub fn advance_to_alignment(&mut self, align: usize) {
        self.pos = align_up(self.pos, align);
    }

    /// Borrow `n` bytes at the current position.
    pub fn peek(&self, n: usize) -> Result<&'a [u8], CursorError> {
        let oob = CursorError::OutOfBounds {
            offset: self.pos,
            len: n,
            size: self.buf.len(),
        };
        let end = self.pos.checked_add(n).ok_or(oob)?;
        self.buf.get(self.pos..end).ok_or(oob)
    }

    /// Borrow `n` bytes and move past them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CursorError> {
        let bytes = self.peek(n)?;
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CursorError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_array<const N: usize>(
        &mut self,
    ) -> Result<[u8; N], CursorError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}
