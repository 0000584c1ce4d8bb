//! Per-ghost change masks.

use bitstream::{BitReader, BitWriter, CompressionModel};
use schema::{GhostTypeId, MAX_CHANGE_BITS};

use crate::error::{CodecError, CodecResult};
use crate::registry::GhostTypeCodec;

/// Maximum number of 32-bit words in a change mask.
pub const MAX_MASK_WORDS: usize = MAX_CHANGE_BITS / 32;

/// One bit per change-tracked field or vector component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeMask {
    words: [u32; MAX_MASK_WORDS],
    bits: u16,
}

impl ChangeMask {
    /// Creates an empty mask of `bits` bits (clamped to [`MAX_CHANGE_BITS`]).
    #[must_use]
    pub fn new(bits: usize) -> Self {
        Self {
            words: [0; MAX_MASK_WORDS],
            bits: bits.min(MAX_CHANGE_BITS) as u16,
        }
    }

    /// Creates a mask with every bit set, used when there is no baseline.
    #[must_use]
    pub fn all(bits: usize) -> Self {
        let mut mask = Self::new(bits);
        for bit in 0..mask.bits() {
            mask.set(bit);
        }
        mask
    }

    #[must_use]
    pub const fn bits(&self) -> usize {
        self.bits as usize
    }

    /// Number of words written on the wire.
    #[must_use]
    pub const fn word_count(&self) -> usize {
        (self.bits as usize).div_ceil(32)
    }

    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words[..self.word_count()]
    }

    pub fn set(&mut self, bit: usize) {
        if bit < self.bits() {
            self.words[bit / 32] |= 1 << (bit % 32);
        }
    }

    #[must_use]
    pub fn get(&self, bit: usize) -> bool {
        bit < self.bits() && self.words[bit / 32] & (1 << (bit % 32)) != 0
    }

    /// Returns `true` if any bit in `start..start + count` is set.
    #[must_use]
    pub fn any_in(&self, start: usize, count: usize) -> bool {
        (start..start + count).any(|bit| self.get(bit))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words().iter().all(|&w| w == 0)
    }

    #[must_use]
    pub fn is_all(&self) -> bool {
        self.count_ones() == self.bits()
    }

    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.words().iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Writes every mask word as a packed uint.
    pub fn write(&self, writer: &mut BitWriter<'_>, model: &CompressionModel) -> CodecResult<()> {
        writer.atomic(|w| {
            for &word in self.words() {
                w.write_packed_uint(word, model)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Reads a mask of `bits` bits, rejecting bits past the end.
    pub fn read(
        reader: &mut BitReader<'_>,
        bits: usize,
        ghost_type: GhostTypeId,
        model: &CompressionModel,
    ) -> CodecResult<Self> {
        let mut mask = Self::new(bits);
        let word_count = mask.word_count();
        for i in 0..word_count {
            mask.words[i] = reader.read_packed_uint(model)?;
        }
        let tail = bits % 32;
        if tail != 0 && word_count > 0 && mask.words[word_count - 1] >> tail != 0 {
            return Err(CodecError::InvalidMask { ghost_type });
        }
        Ok(mask)
    }
}

/// Computes which fields of `current` differ from `baseline`.
///
/// Without a baseline every bit is set. Fields with one change bit per
/// component compare each component word on its own; all other fields set
/// their single bit when any of their words differ.
#[must_use]
pub fn compute_change_mask(
    codec: &GhostTypeCodec,
    current: &[u32],
    baseline: Option<&[u32]>,
) -> ChangeMask {
    let Some(baseline) = baseline else {
        return ChangeMask::all(codec.change_bits());
    };
    let mut mask = ChangeMask::new(codec.change_bits());
    for field in codec.fields() {
        let slot = field.slot;
        let range = slot.word_offset..slot.word_offset + slot.word_count;
        let cur = &current[range.clone()];
        let base = &baseline[range];
        if slot.change_bit_count == 1 {
            if cur != base {
                mask.set(slot.change_bit);
            }
        } else {
            let per_bit = slot.word_count / slot.change_bit_count;
            for (i, (c, b)) in cur.chunks(per_bit).zip(base.chunks(per_bit)).enumerate() {
                if c != b {
                    mask.set(slot.change_bit + i);
                }
            }
        }
    }
    mask
}
