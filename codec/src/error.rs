//! Error types for codec operations.

use std::fmt;

use schema::{GhostTypeId, SchemaError};

use crate::{EntityId, Tick};

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while capturing, encoding, decoding or applying snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Wire format error.
    Wire(wire::DecodeError),

    /// Wire framing failed while encoding.
    WireEncode(wire::EncodeError),

    /// Bitstream error. Overflow while writing is the stream-overflow case.
    Bitstream(bitstream::BitError),

    /// Schema failed validation while building a registry.
    Schema(SchemaError),

    /// Schema hash mismatch.
    SchemaMismatch { expected: u64, found: u64 },

    /// Packet kind does not match the operation.
    UnexpectedPacket { expected: &'static str },

    /// Duplicate section encountered.
    DuplicateSection { section: wire::SectionTag },

    /// Section body had trailing bits after parsing.
    TrailingSectionData {
        section: wire::SectionTag,
        remaining_bits: usize,
    },

    /// Limits exceeded.
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// A slice could not be decoded against the client's state.
    DecodeMismatch {
        entity: EntityId,
        reason: MismatchReason,
    },

    /// A value does not match its field's declared kind.
    TypeMismatch {
        ghost_type: GhostTypeId,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A string value exceeds its field's capacity.
    StringTooLong {
        ghost_type: GhostTypeId,
        field: String,
        len: usize,
        max: usize,
    },

    /// Change mask has bits set beyond the ghost type's change bits.
    InvalidMask { ghost_type: GhostTypeId },

    /// An invalid tick reached an operation that needs a valid one.
    InvalidTick { context: &'static str },

    /// History capacity must be a power of two no larger than the ack window.
    InvalidHistoryCapacity { capacity: usize, max: usize },

    /// Ghost type is not registered.
    UnknownGhostType { ghost_type: GhostTypeId },

    /// Entity is not registered.
    UnknownEntity { entity: EntityId },

    /// Entity is already registered.
    EntityAlreadyExists { entity: EntityId },
}

/// Specific limit that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    GhostsPerPacket,
    Despawns,
    ResyncRequests,
    SliceBits,
    MaskWords,
    Entities,
}

/// Why a slice could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchReason {
    /// The delta baseline is no longer in the ghost's history.
    MissingBaseline { tick: Tick },
    /// The older prediction baseline is no longer in the ghost's history.
    MissingPredictionBaseline { tick: Tick },
    /// A delta slice arrived for a ghost the client does not know.
    UnknownGhost,
    /// The slice refers to a different incarnation of the entity.
    SpawnTickMismatch { expected: Tick, found: Tick },
    /// The slice body did not consume its declared length.
    SliceLength { declared: usize, consumed: usize },
}

impl CodecError {
    /// Returns `true` if a write exceeded the stream's capacity.
    #[must_use]
    pub fn is_stream_overflow(&self) -> bool {
        matches!(self, Self::Bitstream(bitstream::BitError::Overflow { .. }))
    }

    /// Returns `true` for per-entity decode failures that a full resync repairs.
    #[must_use]
    pub fn is_decode_mismatch(&self) -> bool {
        matches!(self, Self::DecodeMismatch { .. })
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::WireEncode(e) => write!(f, "wire encode error: {e}"),
            Self::Bitstream(e) => write!(f, "bitstream error: {e}"),
            Self::Schema(e) => write!(f, "schema error: {e}"),
            Self::SchemaMismatch { expected, found } => {
                write!(
                    f,
                    "schema hash mismatch: expected 0x{expected:016X}, found 0x{found:016X}"
                )
            }
            Self::UnexpectedPacket { expected } => {
                write!(f, "unexpected packet kind, expected {expected}")
            }
            Self::DuplicateSection { section } => {
                write!(f, "duplicate section {section:?} in packet")
            }
            Self::TrailingSectionData {
                section,
                remaining_bits,
            } => {
                write!(
                    f,
                    "trailing data in section {section:?}: {remaining_bits} bits"
                )
            }
            Self::LimitsExceeded {
                kind,
                limit,
                actual,
            } => {
                write!(f, "{kind} limit exceeded: {actual} > {limit}")
            }
            Self::DecodeMismatch { entity, reason } => {
                write!(f, "decode mismatch for entity {entity}: {reason}")
            }
            Self::TypeMismatch {
                ghost_type,
                field,
                expected,
                found,
            } => {
                write!(
                    f,
                    "type mismatch for {ghost_type}.{field}: expected {expected} but got {found}"
                )
            }
            Self::StringTooLong {
                ghost_type,
                field,
                len,
                max,
            } => {
                write!(
                    f,
                    "string for {ghost_type}.{field} is {len} bytes, capacity is {max}"
                )
            }
            Self::InvalidMask { ghost_type } => {
                write!(f, "change mask for ghost type {ghost_type} has unused bits set")
            }
            Self::InvalidTick { context } => write!(f, "invalid tick in {context}"),
            Self::InvalidHistoryCapacity { capacity, max } => {
                write!(
                    f,
                    "history capacity {capacity} must be a power of two in 1..={max}"
                )
            }
            Self::UnknownGhostType { ghost_type } => {
                write!(f, "ghost type {ghost_type} is not registered")
            }
            Self::UnknownEntity { entity } => write!(f, "entity {entity} is not registered"),
            Self::EntityAlreadyExists { entity } => {
                write!(f, "entity {entity} already exists")
            }
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GhostsPerPacket => "ghosts per packet",
            Self::Despawns => "despawns",
            Self::ResyncRequests => "resync requests",
            Self::SliceBits => "slice bits",
            Self::MaskWords => "mask words",
            Self::Entities => "entities",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBaseline { tick } => write!(f, "baseline tick {tick} not in history"),
            Self::MissingPredictionBaseline { tick } => {
                write!(f, "prediction baseline tick {tick} not in history")
            }
            Self::UnknownGhost => write!(f, "delta for unknown ghost"),
            Self::SpawnTickMismatch { expected, found } => {
                write!(f, "spawn tick {found} does not match known spawn tick {expected}")
            }
            Self::SliceLength { declared, consumed } => {
                write!(f, "slice declared {declared} bits but decoding consumed {consumed}")
            }
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Wire(e) => Some(e),
            Self::WireEncode(e) => Some(e),
            Self::Bitstream(e) => Some(e),
            Self::Schema(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wire::DecodeError> for CodecError {
    fn from(err: wire::DecodeError) -> Self {
        Self::Wire(err)
    }
}

impl From<wire::EncodeError> for CodecError {
    fn from(err: wire::EncodeError) -> Self {
        Self::WireEncode(err)
    }
}

impl From<bitstream::BitError> for CodecError {
    fn from(err: bitstream::BitError) -> Self {
        Self::Bitstream(err)
    }
}

impl From<SchemaError> for CodecError {
    fn from(err: SchemaError) -> Self {
        Self::Schema(err)
    }
}
