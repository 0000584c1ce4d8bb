//! Wire framing errors.

use std::fmt;

use crate::packet::SectionTag;

/// Result of decoding wire framing.
pub type WireResult<T> = Result<T, DecodeError>;

/// Why a packet's framing was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// Fewer bytes than a packet header.
    PacketTooSmall { actual: usize, required: usize },

    /// The first four bytes are not `GHST`.
    InvalidMagic { found: u32 },

    UnsupportedVersion { found: u16 },

    /// Reserved bits set, or not exactly one of snapshot/ack.
    InvalidFlags { flags: u16 },

    /// The header's payload length disagrees with the bytes received.
    PayloadLengthMismatch { header_len: u32, actual_len: usize },

    UnknownSectionTag { tag: u8 },

    /// A section that cannot appear in this kind of packet, such as an ack
    /// section inside a snapshot.
    MisplacedSection {
        tag: SectionTag,
        packet: &'static str,
    },

    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    SectionFraming(SectionFramingError),
}

/// Which [`crate::Limits`] field was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    PacketBytes,
    SectionCount,
    SectionLength,
}

/// Malformed section length prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionFramingError {
    /// Length varint longer than five bytes or above `u32::MAX`.
    InvalidVarint,
    /// Section length runs past the end of the payload.
    Truncated { needed: usize, available: usize },
}

/// Why a header or section could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    BufferTooSmall { needed: usize, available: usize },
    /// Section body longer than a `u32` length prefix can describe.
    LengthOverflow { length: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketTooSmall { actual, required } => {
                write!(f, "packet of {actual} bytes is shorter than the {required}-byte header")
            }
            Self::InvalidMagic { found } => write!(f, "not a ghostsync packet (magic 0x{found:08X})"),
            Self::UnsupportedVersion { found } => write!(f, "unsupported wire version {found}"),
            Self::InvalidFlags { flags } => write!(f, "invalid packet flags 0x{flags:04X}"),
            Self::PayloadLengthMismatch {
                header_len,
                actual_len,
            } => write!(
                f,
                "header declares {header_len} payload bytes but {actual_len} follow"
            ),
            Self::UnknownSectionTag { tag } => write!(f, "unknown section tag {tag}"),
            Self::MisplacedSection { tag, packet } => {
                write!(f, "{tag:?} section is not allowed in a {packet} packet")
            }
            Self::LimitsExceeded {
                kind,
                limit,
                actual,
            } => write!(f, "{kind} limit exceeded: {actual} > {limit}"),
            Self::SectionFraming(err) => write!(f, "bad section framing: {err}"),
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PacketBytes => "packet bytes",
            Self::SectionCount => "section count",
            Self::SectionLength => "section length",
        })
    }
}

impl fmt::Display for SectionFramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVarint => f.write_str("invalid length varint"),
            Self::Truncated { needed, available } => {
                write!(f, "truncated section: need {needed} bytes, have {available}")
            }
        }
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall { needed, available } => {
                write!(f, "buffer too small: need {needed}, have {available}")
            }
            Self::LengthOverflow { length } => {
                write!(f, "section body of {length} bytes overflows its length prefix")
            }
        }
    }
}

impl std::error::Error for SectionFramingError {}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SectionFraming(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for EncodeError {}

impl From<SectionFramingError> for DecodeError {
    fn from(err: SectionFramingError) -> Self {
        Self::SectionFraming(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn decode_error_display_invalid_magic() {
        let err = DecodeError::InvalidMagic { found: 0xDEAD_BEEF };
        assert_eq!(err.to_string(), "not a ghostsync packet (magic 0xDEADBEEF)");
    }

    #[test]
    fn decode_error_display_limits_exceeded() {
        let err = DecodeError::LimitsExceeded {
            kind: LimitKind::SectionCount,
            limit: 4,
            actual: 10,
        };
        assert_eq!(err.to_string(), "section count limit exceeded: 10 > 4");
    }

    #[test]
    fn misplaced_section_display() {
        let err = DecodeError::MisplacedSection {
            tag: SectionTag::Ack,
            packet: "snapshot",
        };
        assert_eq!(err.to_string(), "Ack section is not allowed in a snapshot packet");
    }

    #[test]
    fn section_framing_is_the_source() {
        let err: DecodeError = SectionFramingError::Truncated {
            needed: 10,
            available: 4,
        }
        .into();
        assert!(err.to_string().contains("truncated section: need 10 bytes"));
        assert!(err.source().is_some());
        assert!(DecodeError::UnknownSectionTag { tag: 9 }.source().is_none());
    }

    #[test]
    fn encode_error_display() {
        let err = EncodeError::BufferTooSmall {
            needed: 10,
            available: 4,
        };
        assert_eq!(err.to_string(), "buffer too small: need 10, have 4");
    }
}
