//! Bounds-checked sequential reader over a byte buffer.

use crate::error::DecodeError;

/// Sequential reader with little/big-endian integer decoding.
///
/// The cursor only ever moves forward. Reads that would run past the end of
/// the buffer fail with [`DecodeError::OutOfBounds`] and leave the offset
/// untouched.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Current read offset from the start of the buffer
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Move the cursor to an absolute offset.
    pub fn seek(&mut self, offset: usize) -> Result<(), DecodeError> {
        if offset > self.buf.len() {
            return Err(DecodeError::OutOfBounds {
                offset,
                wanted: 0,
                remaining: 0,
            });
        }
        self.offset = offset;
        Ok(())
    }

    /// Bytes left before `end`, or zero when the cursor is already past it.
    pub fn remaining(&self, end: usize) -> usize {
        end.min(self.buf.len()).saturating_sub(self.offset)
    }

    /// Consume exactly `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.buf.len() - self.offset;
        if len > remaining {
            return Err(DecodeError::OutOfBounds {
                offset: self.offset,
                wanted: len,
                remaining,
            });
        }
        let bytes = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self, little_endian: bool) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        let b = [b[0], b[1]];
        Ok(if little_endian {
            u16::from_le_bytes(b)
        } else {
            u16::from_be_bytes(b)
        })
    }

    pub fn read_u32(&mut self, little_endian: bool) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        let b = [b[0], b[1], b[2], b[3]];
        Ok(if little_endian {
            u32::from_le_bytes(b)
        } else {
            u32::from_be_bytes(b)
        })
    }

    /// Read an unsigned integer of 1, 2, or 4 bytes, widened to `u32`.
    ///
    /// Any other width consumes the bytes and yields `None`.
    pub fn read_uint(&mut self, width: u8, little_endian: bool) -> Result<Option<u32>, DecodeError> {
        match width {
            1 => self.read_u8().map(|v| Some(v as u32)),
            2 => self.read_u16(little_endian).map(|v| Some(v as u32)),
            4 => self.read_u32(little_endian).map(Some),
            n => self.take(n as usize).map(|_| None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_both_endiannesses() {
        let buf = [0x01, 0x02, 0x01, 0x02, 0x01, 0x02, 0x03, 0x04];
        let mut c = ByteCursor::new(&buf);

        assert_eq!(c.read_u16(true).unwrap(), 0x0201);
        assert_eq!(c.read_u16(false).unwrap(), 0x0102);
        assert_eq!(c.read_u32(false).unwrap(), 0x01020304);
        assert_eq!(c.offset(), 8);
    }

    #[test]
    fn test_out_of_bounds_leaves_offset() {
        let buf = [0xAA, 0xBB, 0xCC];
        let mut c = ByteCursor::new(&buf);
        c.read_u8().unwrap();

        let err = c.read_u32(true).unwrap_err();
        assert_eq!(
            err,
            DecodeError::OutOfBounds {
                offset: 1,
                wanted: 4,
                remaining: 2
            }
        );
        assert_eq!(c.offset(), 1);
        assert_eq!(c.read_u16(true).unwrap(), 0xCCBB);
    }

    #[test]
    fn test_read_uint_skips_odd_widths() {
        let buf = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80, 0x7F];
        let mut c = ByteCursor::new(&buf);

        assert_eq!(c.read_uint(8, true).unwrap(), None);
        assert_eq!(c.read_uint(1, true).unwrap(), Some(0x7F));
    }

    #[test]
    fn test_remaining_respects_end() {
        let buf = [0u8; 10];
        let mut c = ByteCursor::new(&buf);
        c.take(4).unwrap();

        assert_eq!(c.remaining(8), 4);
        assert_eq!(c.remaining(20), 6);
        assert_eq!(c.remaining(2), 0);
    }
}
