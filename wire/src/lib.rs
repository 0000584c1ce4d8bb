//! Wire framing and packet layout for ghostsync.
//!
//! This crate handles the binary wire format: packet headers, section framing,
//! and limit enforcement. It does not know about ghosts or snapshots, only the
//! structure of packets.
//!
//! # Design Principles
//!
//! - **Stable wire format** - The format is versioned and the header carries a schema hash.
//! - **Bounded decoding** - All length fields are validated against limits before iteration.
//! - **No domain knowledge** - This crate handles framing, not replication logic.
//!
//! # Layout
//!
//! ```text
//! [magic u32][version u16][flags u16][schema_hash u64][tick u32][payload_len u32]
//! [section tag u8][varint len][body] ...
//! ```
//!
//! All header integers are little-endian.

mod error;
mod header;
mod limits;
mod packet;

pub use error::{DecodeError, EncodeError, LimitKind, SectionFramingError, WireResult};
pub use header::{PacketFlags, PacketHeader, HEADER_SIZE, MAGIC, VERSION};
pub use limits::Limits;
pub use packet::{
    decode_packet, decode_sections, encode_header, encode_section, varu32_len, write_varu32,
    SectionTag, WirePacket, WireSection,
};
