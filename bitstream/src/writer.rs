//! Bit-level writer over a fixed-capacity buffer.

use crate::error::{BitError, BitResult};

/// A saved writer position, used to rewind or patch previously written bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitCheckpoint(usize);

impl BitCheckpoint {
    /// Returns the bit position captured by this checkpoint.
    #[must_use]
    pub const fn bit_position(self) -> usize {
        self.0
    }
}

/// A bit-level writer for encoding packed binary data into a caller-owned buffer.
///
/// The buffer capacity is fixed. Every write either completes or fails with
/// [`BitError::Overflow`] leaving the writer untouched, so callers can try to
/// fit optional data and fall back without cleanup.
#[derive(Debug)]
pub struct BitWriter<'a> {
    buf: &'a mut [u8],
    bit_pos: usize,
}

impl<'a> BitWriter<'a> {
    /// Creates a writer over `buf`. Existing contents are overwritten as bits are written.
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, bit_pos: 0 }
    }

    /// Total capacity in bits.
    #[must_use]
    pub fn capacity_bits(&self) -> usize {
        self.buf.len().saturating_mul(8)
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub const fn bits_written(&self) -> usize {
        self.bit_pos
    }

    /// Returns the number of bytes touched so far (partial bytes count).
    #[must_use]
    pub const fn bytes_written(&self) -> usize {
        self.bit_pos.div_ceil(8)
    }

    /// Returns the number of bits that can still be written.
    #[must_use]
    pub fn remaining_bits(&self) -> usize {
        self.capacity_bits() - self.bit_pos
    }

    /// Captures the current position.
    #[must_use]
    pub const fn checkpoint(&self) -> BitCheckpoint {
        BitCheckpoint(self.bit_pos)
    }

    /// Rewinds to a previously captured position, discarding later bits.
    pub fn rewind(&mut self, checkpoint: BitCheckpoint) {
        if checkpoint.0 <= self.bit_pos {
            self.bit_pos = checkpoint.0;
        }
    }

    /// Runs `f` and rewinds to the starting position if it fails.
    pub fn atomic<T>(&mut self, f: impl FnOnce(&mut Self) -> BitResult<T>) -> BitResult<T> {
        let start = self.checkpoint();
        let result = f(self);
        if result.is_err() {
            self.rewind(start);
        }
        result
    }

    /// Writes a single bit.
    pub fn write_bit(&mut self, value: bool) -> BitResult<()> {
        self.ensure_capacity(1)?;
        self.put_bit(value);
        Ok(())
    }

    /// Writes exactly `bits` bits of `value` (`bits <= 32`), MSB first.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits > 32`,
    /// [`BitError::ValueOutOfRange`] if `value` doesn't fit in `bits`, and
    /// [`BitError::Overflow`] if the buffer cannot hold them.
    pub fn write_raw_bits(&mut self, value: u32, bits: u8) -> BitResult<()> {
        if bits > 32 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 32 });
        }
        self.write_bits(u64::from(value), bits)
    }

    /// Writes up to 64 bits from an unsigned integer.
    pub fn write_bits(&mut self, value: u64, bits: u8) -> BitResult<()> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(());
        }
        if bits < 64 && value >= (1u64 << bits) {
            return Err(BitError::ValueOutOfRange { value, bits });
        }
        self.ensure_capacity(usize::from(bits))?;
        for i in (0..bits).rev() {
            self.put_bit((value >> i) & 1 == 1);
        }
        Ok(())
    }

    /// Overwrites `bits` bits at a checkpoint without moving the write position.
    ///
    /// Used for length prefixes that are only known after the body is written.
    pub fn patch_raw_bits(
        &mut self,
        at: BitCheckpoint,
        value: u32,
        bits: u8,
    ) -> BitResult<()> {
        if bits > 32 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 32 });
        }
        if bits < 32 && value >= (1u32 << bits) {
            return Err(BitError::ValueOutOfRange {
                value: u64::from(value),
                bits,
            });
        }
        let end = at.0 + usize::from(bits);
        if end > self.bit_pos {
            return Err(BitError::Overflow {
                requested: end,
                available: self.bit_pos,
            });
        }
        let saved = self.bit_pos;
        self.bit_pos = at.0;
        for i in (0..bits).rev() {
            self.put_bit((value >> i) & 1 == 1);
        }
        self.bit_pos = saved;
        Ok(())
    }

    /// Writes raw bytes at the current bit position.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> BitResult<()> {
        self.ensure_capacity(bytes.len().saturating_mul(8))?;
        for &byte in bytes {
            for i in (0..8).rev() {
                self.put_bit((byte >> i) & 1 == 1);
            }
        }
        Ok(())
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) -> BitResult<()> {
        let rem = self.bit_pos % 8;
        if rem == 0 {
            return Ok(());
        }
        let pad = 8 - rem;
        self.ensure_capacity(pad)?;
        for _ in 0..pad {
            self.put_bit(false);
        }
        Ok(())
    }

    /// Writes a byte-aligned `u8`.
    pub fn write_u8_aligned(&mut self, value: u8) -> BitResult<()> {
        self.write_aligned_bytes(&[value])
    }

    /// Writes a byte-aligned `u16` (little-endian).
    pub fn write_u16_aligned(&mut self, value: u16) -> BitResult<()> {
        self.write_aligned_bytes(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `u32` (little-endian).
    pub fn write_u32_aligned(&mut self, value: u32) -> BitResult<()> {
        self.write_aligned_bytes(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `u64` (little-endian).
    pub fn write_u64_aligned(&mut self, value: u64) -> BitResult<()> {
        self.write_aligned_bytes(&value.to_le_bytes())
    }

    /// Writes a byte-aligned varint `u32`.
    pub fn write_varu32(&mut self, mut value: u32) -> BitResult<()> {
        self.ensure_aligned()?;
        let mut encoded = [0u8; 5];
        let mut len = 0;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            encoded[len] = byte;
            len += 1;
            if value == 0 {
                break;
            }
        }
        self.write_aligned_bytes(&encoded[..len])
    }

    /// Writes a byte-aligned zigzag varint `i32`.
    pub fn write_vars32(&mut self, value: i32) -> BitResult<()> {
        self.write_varu32(crate::zigzag_encode(value))
    }

    /// Finishes writing and returns the number of bytes used.
    ///
    /// Unused bits of the final byte are cleared.
    pub fn finish(self) -> usize {
        let len = self.bytes_written();
        let rem = self.bit_pos % 8;
        if rem != 0 {
            let keep = 0xFFu8 << (8 - rem);
            self.buf[len - 1] &= keep;
        }
        len
    }

    fn write_aligned_bytes(&mut self, bytes: &[u8]) -> BitResult<()> {
        self.ensure_aligned()?;
        self.ensure_capacity(bytes.len() * 8)?;
        let start = self.bit_pos / 8;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        self.bit_pos += bytes.len() * 8;
        Ok(())
    }

    fn ensure_aligned(&self) -> BitResult<()> {
        if self.bit_pos % 8 != 0 {
            return Err(BitError::MisalignedAccess {
                bit_position: self.bit_pos,
            });
        }
        Ok(())
    }

    pub(crate) fn ensure_capacity(&self, bits: usize) -> BitResult<()> {
        let available = self.remaining_bits();
        if bits > available {
            return Err(BitError::Overflow {
                requested: bits,
                available,
            });
        }
        Ok(())
    }

    fn put_bit(&mut self, value: bool) {
        let idx = self.bit_pos / 8;
        let mask = 1u8 << (7 - (self.bit_pos % 8));
        if value {
            self.buf[idx] |= mask;
        } else {
            self.buf[idx] &= !mask;
        }
        self.bit_pos += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_writer() {
        let mut buf = [0u8; 4];
        let writer = BitWriter::new(&mut buf);
        assert_eq!(writer.bits_written(), 0);
        assert_eq!(writer.finish(), 0);
    }

    #[test]
    fn write_single_bit_true() {
        let mut buf = [0u8; 1];
        let mut writer = BitWriter::new(&mut buf);
        writer.write_bit(true).unwrap();
        assert_eq!(writer.bits_written(), 1);
        assert_eq!(writer.finish(), 1);
        assert_eq!(buf, [0b1000_0000]);
    }

    #[test]
    fn write_raw_bits_across_byte_boundary() {
        let mut buf = [0u8; 2];
        let mut writer = BitWriter::new(&mut buf);
        writer.write_raw_bits(0b1111, 4).unwrap();
        writer.write_raw_bits(0b1010_1010, 8).unwrap();
        assert_eq!(writer.finish(), 2);
        assert_eq!(buf, [0b1111_1010, 0b1010_0000]);
    }

    #[test]
    fn write_raw_bits_rejects_more_than_32() {
        let mut buf = [0u8; 8];
        let mut writer = BitWriter::new(&mut buf);
        let err = writer.write_raw_bits(0, 33).unwrap_err();
        assert!(matches!(err, BitError::InvalidBitCount { bits: 33, max_bits: 32 }));
    }

    #[test]
    fn write_bits_value_out_of_range() {
        let mut buf = [0u8; 1];
        let mut writer = BitWriter::new(&mut buf);
        let err = writer.write_raw_bits(16, 4).unwrap_err();
        assert!(matches!(err, BitError::ValueOutOfRange { value: 16, bits: 4 }));
    }

    #[test]
    fn overflow_leaves_writer_unchanged() {
        let mut buf = [0u8; 1];
        let mut writer = BitWriter::new(&mut buf);
        writer.write_raw_bits(0b101, 3).unwrap();
        let err = writer.write_raw_bits(0xFF, 8).unwrap_err();
        assert_eq!(
            err,
            BitError::Overflow {
                requested: 8,
                available: 5
            }
        );
        assert_eq!(writer.bits_written(), 3);
        writer.write_raw_bits(0b11111, 5).unwrap();
        assert_eq!(writer.finish(), 1);
        assert_eq!(buf, [0b1011_1111]);
    }

    #[test]
    fn atomic_rewinds_partial_sequence() {
        let mut buf = [0u8; 2];
        let mut writer = BitWriter::new(&mut buf);
        writer.write_bit(true).unwrap();
        let result = writer.atomic(|w| {
            w.write_raw_bits(0xFF, 8)?;
            w.write_raw_bits(0xFF, 8)
        });
        assert!(result.is_err());
        assert_eq!(writer.bits_written(), 1);
    }

    #[test]
    fn rewind_then_finish_clears_stale_bits() {
        let mut buf = [0u8; 1];
        let mut writer = BitWriter::new(&mut buf);
        writer.write_bit(true).unwrap();
        let cp = writer.checkpoint();
        writer.write_raw_bits(0b111, 3).unwrap();
        writer.rewind(cp);
        assert_eq!(writer.finish(), 1);
        assert_eq!(buf, [0b1000_0000]);
    }

    #[test]
    fn patch_raw_bits_overwrites_placeholder() {
        let mut buf = [0u8; 3];
        let mut writer = BitWriter::new(&mut buf);
        writer.write_bit(true).unwrap();
        let at = writer.checkpoint();
        writer.write_raw_bits(0, 16).unwrap();
        writer.write_bit(true).unwrap();
        writer.patch_raw_bits(at, 0xABCD, 16).unwrap();
        assert_eq!(writer.bits_written(), 18);
        writer.finish();
        assert_eq!(buf, [0b1101_0101, 0b1110_0110, 0b1100_0000]);
    }

    #[test]
    fn patch_beyond_written_fails() {
        let mut buf = [0u8; 4];
        let mut writer = BitWriter::new(&mut buf);
        let at = writer.checkpoint();
        writer.write_raw_bits(0, 4).unwrap();
        assert!(writer.patch_raw_bits(at, 1, 8).is_err());
    }

    #[test]
    fn aligned_writes_require_alignment() {
        let mut buf = [0u8; 8];
        let mut writer = BitWriter::new(&mut buf);
        writer.write_bit(true).unwrap();
        let err = writer.write_u32_aligned(7).unwrap_err();
        assert!(matches!(err, BitError::MisalignedAccess { bit_position: 1 }));
        writer.align_to_byte().unwrap();
        writer.write_u32_aligned(7).unwrap();
        assert_eq!(writer.finish(), 5);
    }

    #[test]
    fn varu32_encoding() {
        let mut buf = [0u8; 5];
        let mut writer = BitWriter::new(&mut buf);
        writer.write_varu32(300).unwrap();
        assert_eq!(writer.finish(), 2);
        assert_eq!(&buf[..2], &[0xAC, 0x02]);
    }
}
