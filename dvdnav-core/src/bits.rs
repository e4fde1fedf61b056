//! Byte and bit level readers.
//!
//! Everything on a DVD is big-endian. `ByteCursor` walks an IFO or NAV
//! buffer, `BitReader` pulls MSB-first bitfields out of it and
//! `extract_bits` slices fields out of a 64-bit VM instruction word.

use bytes::{Buf, Bytes};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("read of {len} bytes at offset {offset} overruns buffer of {size} bytes")]
    OutOfBounds { offset: usize, len: usize, size: usize },
    #[error("seek to {offset} beyond end of buffer ({size} bytes)")]
    BadSeek { offset: usize, size: usize },
}

// ============================================================================
// Byte Cursor
// ============================================================================

/// Cursor over an immutable byte buffer.
///
/// `peek_*` reads at the current position without moving it, `read_*`
/// advances past the value.
#[derive(Debug, Clone)]
pub struct ByteCursor {
    data: Bytes,
    position: usize,
}

impl ByteCursor {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Absolute seek. Seeking exactly to the end is allowed.
    pub fn seek(&mut self, offset: usize) -> Result<(), CursorError> {
        if offset > self.data.len() {
            return Err(CursorError::BadSeek {
                offset,
                size: self.data.len(),
            });
        }
        self.position = offset;
        Ok(())
    }

    /// Relative skip forward.
    pub fn forward(&mut self, count: usize) -> Result<(), CursorError> {
        self.seek(self.position + count)
    }

    fn window(&self, len: usize) -> Result<&[u8], CursorError> {
        let end = self.position.checked_add(len).filter(|&e| e <= self.data.len());
        match end {
            Some(end) => Ok(&self.data[self.position..end]),
            None => Err(CursorError::OutOfBounds {
                offset: self.position,
                len,
                size: self.data.len(),
            }),
        }
    }

    pub fn peek_u8(&self) -> Result<u8, CursorError> {
        Ok(self.window(1)?.get_u8())
    }

    pub fn peek_u16(&self) -> Result<u16, CursorError> {
        Ok(self.window(2)?.get_u16())
    }

    pub fn peek_u32(&self) -> Result<u32, CursorError> {
        Ok(self.window(4)?.get_u32())
    }

    pub fn peek_u64(&self) -> Result<u64, CursorError> {
        Ok(self.window(8)?.get_u64())
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        let v = self.peek_u8()?;
        self.position += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        let v = self.peek_u16()?;
        self.position += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        let v = self.peek_u32()?;
        self.position += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64, CursorError> {
        let v = self.peek_u64()?;
        self.position += 8;
        Ok(v)
    }

    /// Zero-copy slice of the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, CursorError> {
        self.window(len)?;
        let out = self.data.slice(self.position..self.position + len);
        self.position += len;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CursorError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.window(N)?);
        self.position += N;
        Ok(out)
    }

    /// Fixed-length string; trailing NULs and spaces are trimmed.
    pub fn read_string(&mut self, len: usize) -> Result<String, CursorError> {
        let raw = self.window(len)?;
        let text = String::from_utf8_lossy(raw)
            .trim_end_matches(['\0', ' '])
            .to_string();
        self.position += len;
        Ok(text)
    }

    /// Sub-cursor over `len` bytes at absolute `offset`, positioned at 0.
    pub fn sub_cursor(&self, offset: usize, len: usize) -> Result<ByteCursor, CursorError> {
        let end = offset.checked_add(len).filter(|&e| e <= self.data.len());
        match end {
            Some(end) => Ok(ByteCursor::new(self.data.slice(offset..end))),
            None => Err(CursorError::OutOfBounds {
                offset,
                len,
                size: self.data.len(),
            }),
        }
    }
}

// ============================================================================
// Bit Reader
// ============================================================================

/// MSB-first bit reader sharing a one byte lookahead with its cursor.
///
/// A new byte is pulled from the cursor whenever the lookahead is exhausted,
/// so a run of fields must add up to whole bytes before byte-aligned reads
/// resume on the cursor.
#[derive(Debug, Default, Clone)]
pub struct BitReader {
    current: u8,
    bits_left: u8,
}

impl BitReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether there are unread bits in the lookahead byte.
    pub fn is_aligned(&self) -> bool {
        self.bits_left == 0
    }

    pub fn read(&mut self, cursor: &mut ByteCursor, mut count: u8) -> Result<u32, CursorError> {
        debug_assert!(count <= 32, "bit field wider than 32 bits");
        let mut value = 0u32;
        while count > 0 {
            if self.bits_left == 0 {
                self.current = cursor.read_u8()?;
                self.bits_left = 8;
            }
            let take = self.bits_left.min(count);
            let shift = self.bits_left - take;
            let mask = ((1u16 << take) - 1) as u8;
            value = (value << take) | ((self.current >> shift) & mask) as u32;
            self.bits_left -= take;
            count -= take;
        }
        Ok(value)
    }
}

// ============================================================================
// Instruction Bit Extraction
// ============================================================================

/// Extract `count` bits of a 64-bit instruction whose most significant bit
/// sits at bit index `start` (63 = MSB of the word, 0 = LSB).
///
/// `count` must be in `1..=32` and `start` in `count - 1..=63`. Anything else
/// is a caller defect: it panics in debug builds and yields 0 in release.
#[inline]
pub fn extract_bits(word: u64, start: u8, count: u8) -> u32 {
    let valid = (1..=32).contains(&count) && start <= 63 && start + 1 >= count;
    debug_assert!(valid, "extract_bits({start}, {count}) out of range");
    if !valid {
        return 0;
    }
    let shift = start + 1 - count;
    let mask = if count == 32 { u32::MAX as u64 } else { (1u64 << count) - 1 };
    ((word >> shift) & mask) as u32
}
