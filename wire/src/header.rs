//! Packet header types and constants.

/// Magic number identifying ghostsync packets.
///
/// This value is fixed and must never change across versions.
pub const MAGIC: u32 = 0x4748_5354; // "GHST" in ASCII

/// Current wire format version.
pub const VERSION: u16 = 1;

/// Header size in bytes (24 total).
pub const HEADER_SIZE: usize = 4 + 2 + 2 + 8 + 4 + 4;

/// Packet flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PacketFlags(u16);

impl PacketFlags {
    /// Server to client snapshot packet.
    pub const SNAPSHOT: u16 = 1 << 0;

    /// Client to server acknowledgement packet.
    pub const ACK: u16 = 1 << 1;

    /// Reserved bits mask (must be zero in version 1).
    const RESERVED_MASK: u16 = !0b11;

    /// Creates new flags from a raw value.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns `true` if this is a snapshot packet.
    #[must_use]
    pub const fn is_snapshot(self) -> bool {
        self.0 & Self::SNAPSHOT != 0
    }

    /// Returns `true` if this is an acknowledgement packet.
    #[must_use]
    pub const fn is_ack(self) -> bool {
        self.0 & Self::ACK != 0
    }

    /// Returns `true` if exactly one packet kind is set and no reserved bits are.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        let has_reserved = self.0 & Self::RESERVED_MASK != 0;
        !has_reserved && (self.is_snapshot() ^ self.is_ack())
    }

    /// Creates flags for a snapshot packet.
    #[must_use]
    pub const fn snapshot() -> Self {
        Self(Self::SNAPSHOT)
    }

    /// Creates flags for an acknowledgement packet.
    #[must_use]
    pub const fn ack() -> Self {
        Self(Self::ACK)
    }
}

/// Packet header.
///
/// This struct represents the header fields *after* the magic number.
/// The magic number is validated separately during decoding and is not
/// stored in this struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Wire format version.
    pub version: u16,
    /// Packet flags.
    pub flags: PacketFlags,
    /// Schema hash for compatibility checking.
    pub schema_hash: u64,
    /// Snapshot tick, or the newest received tick for acknowledgements.
    pub tick: u32,
    /// Payload length in bytes.
    pub payload_len: u32,
}

impl PacketHeader {
    /// Creates a new header for a snapshot packet.
    #[must_use]
    pub const fn snapshot(schema_hash: u64, tick: u32, payload_len: u32) -> Self {
        Self {
            version: VERSION,
            flags: PacketFlags::snapshot(),
            schema_hash,
            tick,
            payload_len,
        }
    }

    /// Creates a new header for an acknowledgement packet.
    #[must_use]
    pub const fn ack(schema_hash: u64, tick: u32, payload_len: u32) -> Self {
        Self {
            version: VERSION,
            flags: PacketFlags::ack(),
            schema_hash,
            tick,
            payload_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_is_ghst_ascii() {
        let bytes = MAGIC.to_be_bytes();
        assert_eq!(&bytes, b"GHST");
    }

    #[test]
    fn header_size_is_correct() {
        // magic(4) + version(2) + flags(2) + schema_hash(8) + tick(4) + payload_len(4)
        assert_eq!(HEADER_SIZE, 24);
    }

    #[test]
    fn flags_snapshot() {
        let flags = PacketFlags::snapshot();
        assert!(flags.is_snapshot());
        assert!(!flags.is_ack());
        assert!(flags.is_valid());
        assert_eq!(flags.raw(), 0b01);
    }

    #[test]
    fn flags_ack() {
        let flags = PacketFlags::ack();
        assert!(flags.is_ack());
        assert!(!flags.is_snapshot());
        assert!(flags.is_valid());
    }

    #[test]
    fn flags_invalid_neither_set() {
        assert!(!PacketFlags::from_raw(0).is_valid());
    }

    #[test]
    fn flags_invalid_both_set() {
        assert!(!PacketFlags::from_raw(0b11).is_valid());
    }

    #[test]
    fn flags_invalid_reserved_bits() {
        assert!(!PacketFlags::from_raw(0b101).is_valid());
    }

    #[test]
    fn header_constructors() {
        let header = PacketHeader::snapshot(0x1234, 100, 512);
        assert_eq!(header.version, VERSION);
        assert!(header.flags.is_snapshot());
        assert_eq!(header.tick, 100);

        let ack = PacketHeader::ack(0x1234, 99, 9);
        assert!(ack.flags.is_ack());
        assert_eq!(ack.payload_len, 9);
    }
}
