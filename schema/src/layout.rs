//! Snapshot word layout and change-mask bit assignment for a ghost type.

use crate::{FieldKind, GhostTypeDef};

/// Maximum change-mask bits per ghost type (eight 32-bit mask words).
pub const MAX_CHANGE_BITS: usize = 256;

/// Placement of one replicated field inside a snapshot buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    /// Index of the field in its ghost type's declaration list.
    pub field_index: usize,
    pub kind: FieldKind,
    /// First 32-bit word of the field in the snapshot buffer.
    pub word_offset: usize,
    pub word_count: usize,
    /// First change-mask bit owned by the field.
    pub change_bit: usize,
    pub change_bit_count: usize,
}

/// Layout of a ghost type's snapshot buffer.
///
/// Only replicated fields get a slot. Slots follow declaration order, so
/// change bits and wire order agree on both peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostLayout {
    slots: Vec<FieldSlot>,
    word_count: usize,
    change_bits: usize,
}

impl GhostLayout {
    #[must_use]
    pub fn new(ghost_type: &GhostTypeDef) -> Self {
        let mut slots = Vec::new();
        let mut word_offset = 0;
        let mut change_bit = 0;
        for (field_index, field) in ghost_type.replicated_fields() {
            let slot = FieldSlot {
                field_index,
                kind: field.kind,
                word_offset,
                word_count: field.kind.word_count(),
                change_bit,
                change_bit_count: field.change_bit_count(),
            };
            word_offset += slot.word_count;
            change_bit += slot.change_bit_count;
            slots.push(slot);
        }
        Self {
            slots,
            word_count: word_offset,
            change_bits: change_bit,
        }
    }

    #[must_use]
    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    /// Total snapshot words for one ghost of this type.
    #[must_use]
    pub const fn word_count(&self) -> usize {
        self.word_count
    }

    #[must_use]
    pub const fn change_bits(&self) -> usize {
        self.change_bits
    }

    /// Number of 32-bit words needed to hold the change mask.
    #[must_use]
    pub const fn mask_words(&self) -> usize {
        self.change_bits.div_ceil(32)
    }
}
