//! Limits for snapshot and ack decoding.

/// Codec-specific limits enforced while decoding and building packets.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CodecLimits {
    /// Maximum number of ghost slices in one snapshot packet.
    pub max_ghosts_per_packet: usize,
    /// Maximum number of despawn entries in one snapshot packet.
    pub max_despawns_per_packet: usize,
    /// Maximum number of resync requests in one ack packet.
    pub max_resync_requests: usize,
    /// Maximum body size of one ghost slice, in bits. Capped by the 16-bit length field.
    pub max_slice_bits: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_ghosts_per_packet: 1024,
            max_despawns_per_packet: 1024,
            max_resync_requests: 256,
            max_slice_bits: usize::from(u16::MAX),
        }
    }
}

impl CodecLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_ghosts_per_packet: 32,
            max_despawns_per_packet: 32,
            max_resync_requests: 16,
            max_slice_bits: 4096,
        }
    }

    /// Creates limits with no restrictions beyond the wire format's own.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_ghosts_per_packet: usize::MAX,
            max_despawns_per_packet: usize::MAX,
            max_resync_requests: usize::MAX,
            max_slice_bits: u16::MAX as usize,
        }
    }
}
