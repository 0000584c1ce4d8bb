//! Schema validation errors.

use std::fmt;

use crate::GhostTypeId;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur when building or validating a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Duplicate ghost type ID in a schema.
    DuplicateGhostTypeId { id: GhostTypeId },

    /// Duplicate field name within a ghost type.
    DuplicateFieldName { ghost_type: GhostTypeId, field: String },

    /// Quantization factor must be non-zero.
    InvalidQuantization { ghost_type: GhostTypeId, field: String },

    /// Quantization applied to a kind without a floating representation.
    QuantizationNotSupported {
        ghost_type: GhostTypeId,
        field: String,
        kind: &'static str,
    },

    /// Composite requested on a kind without separate components.
    CompositeNotSupported {
        ghost_type: GhostTypeId,
        field: String,
        kind: &'static str,
    },

    /// Smoothing distance must be finite and positive.
    InvalidSmoothingDistance { ghost_type: GhostTypeId, field: String },

    /// A buffer-kind type must replicate all of its fields or none of them.
    PartialBufferReplication {
        ghost_type: GhostTypeId,
        replicated: usize,
        total: usize,
    },

    /// Change mask would exceed the supported width.
    TooManyChangeBits {
        ghost_type: GhostTypeId,
        bits: usize,
        max: usize,
    },

    /// A full slice of this type can outgrow the slice length prefix.
    SliceTooLarge {
        ghost_type: GhostTypeId,
        worst_case_bits: usize,
        max: usize,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateGhostTypeId { id } => write!(f, "duplicate ghost type id {id}"),
            Self::DuplicateFieldName { ghost_type, field } => {
                write!(f, "ghost type {ghost_type}: duplicate field '{field}'")
            }
            Self::InvalidQuantization { ghost_type, field } => {
                write!(f, "ghost type {ghost_type}: field '{field}' has a zero quantization factor")
            }
            Self::QuantizationNotSupported {
                ghost_type,
                field,
                kind,
            } => write!(
                f,
                "ghost type {ghost_type}: field '{field}' of kind {kind} cannot be quantized"
            ),
            Self::CompositeNotSupported {
                ghost_type,
                field,
                kind,
            } => write!(
                f,
                "ghost type {ghost_type}: field '{field}' of kind {kind} cannot be composite"
            ),
            Self::InvalidSmoothingDistance { ghost_type, field } => write!(
                f,
                "ghost type {ghost_type}: field '{field}' has an invalid smoothing distance"
            ),
            Self::PartialBufferReplication {
                ghost_type,
                replicated,
                total,
            } => write!(
                f,
                "buffer ghost type {ghost_type} replicates {replicated} of {total} fields; \
                 buffers replicate all fields or none"
            ),
            Self::TooManyChangeBits {
                ghost_type,
                bits,
                max,
            } => write!(
                f,
                "ghost type {ghost_type} needs {bits} change bits, maximum is {max}"
            ),
            Self::SliceTooLarge {
                ghost_type,
                worst_case_bits,
                max,
            } => write!(
                f,
                "ghost type {ghost_type}: a full slice can take {worst_case_bits} bits, \
                 a slice holds at most {max}"
            ),
        }
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_buffer_display() {
        let err = SchemaError::PartialBufferReplication {
            ghost_type: GhostTypeId::new(4),
            replicated: 1,
            total: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("1 of 3"));
        assert!(msg.contains("all fields or none"));
    }

    #[test]
    fn too_many_bits_display() {
        let err = SchemaError::TooManyChangeBits {
            ghost_type: GhostTypeId::new(1),
            bits: 300,
            max: 256,
        };
        assert!(err.to_string().contains("300"));
    }

    #[test]
    fn slice_too_large_display() {
        let err = SchemaError::SliceTooLarge {
            ghost_type: GhostTypeId::new(2),
            worst_case_bits: 65_600,
            max: 65_535,
        };
        let msg = err.to_string();
        assert!(msg.contains("65600"));
        assert!(msg.contains("65535"));
    }
}
