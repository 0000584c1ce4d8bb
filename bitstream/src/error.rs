//! Error types for bitstream operations.

use std::fmt;

/// Result type for bitstream operations.
pub type BitResult<T> = Result<T, BitError>;

/// Errors that can occur during bit-level encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitError {
    /// Attempted to read past the end of the buffer.
    UnexpectedEof {
        /// Number of bits requested.
        requested: usize,
        /// Number of bits available.
        available: usize,
    },

    /// Attempted to write more bits than the backing buffer can hold.
    ///
    /// The writer state is left exactly as it was before the failed write.
    Overflow {
        /// Number of bits the write needed.
        requested: usize,
        /// Number of bits left in the buffer.
        available: usize,
    },

    /// Invalid bit count for the operation.
    InvalidBitCount {
        /// The invalid bit count provided.
        bits: u8,
        /// Maximum allowed bits for this operation.
        max_bits: u8,
    },

    /// Value exceeds the range representable by the specified number of bits.
    ValueOutOfRange {
        /// The value that was out of range.
        value: u64,
        /// Number of bits available.
        bits: u8,
    },

    /// Aligned access attempted at a non-byte boundary.
    MisalignedAccess { bit_position: usize },

    /// Varint continuation ran past five bytes.
    InvalidVarint,

    /// A packed value used a prefix code the compression model does not define.
    InvalidPackedCode,

    /// Fixed string length exceeds its capacity.
    StringTooLong { len: usize, capacity: usize },

    /// Compression model tables are inconsistent.
    InvalidModel { reason: &'static str },
}

impl fmt::Display for BitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof {
                requested,
                available,
            } => {
                write!(
                    f,
                    "attempted to read {requested} bits but only {available} bits available"
                )
            }
            Self::Overflow {
                requested,
                available,
            } => {
                write!(
                    f,
                    "attempted to write {requested} bits but only {available} bits of capacity remain"
                )
            }
            Self::InvalidBitCount { bits, max_bits } => {
                write!(f, "invalid bit count {bits}, maximum allowed is {max_bits}")
            }
            Self::ValueOutOfRange { value, bits } => {
                write!(f, "value {value} cannot be represented in {bits} bits")
            }
            Self::MisalignedAccess { bit_position } => {
                write!(f, "aligned access at bit position {bit_position}")
            }
            Self::InvalidVarint => write!(f, "invalid varint encoding"),
            Self::InvalidPackedCode => write!(f, "invalid packed prefix code"),
            Self::StringTooLong { len, capacity } => {
                write!(f, "string of {len} bytes exceeds capacity {capacity}")
            }
            Self::InvalidModel { reason } => write!(f, "invalid compression model: {reason}"),
        }
    }
}

impl std::error::Error for BitError {}
