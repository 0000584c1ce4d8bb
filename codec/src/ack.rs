//! Received-tick tracking and ack packets.
//!
//! An ack packet carries the newest received tick in its header and one
//! section: `[received mask raw64][resync count packed][entity packed]*`.
//! Bit `i` of the mask means tick `last - i` was received.

use bitstream::{BitReader, CompressionModel};
use wire::{decode_packet, encode_header, PacketHeader, SectionTag, HEADER_SIZE};

use crate::error::{CodecError, CodecResult, LimitKind};
use crate::limits::CodecLimits;
use crate::packet::{ensure_consumed, too_small, write_section};
use crate::registry::CodecRegistry;
use crate::{EntityId, Tick};

/// Number of ticks an ack covers.
pub const ACK_WINDOW: u32 = 64;

/// Which of the last 64 ticks were received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckState {
    last: Tick,
    mask: u64,
}

impl AckState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest received tick, or invalid if nothing was received.
    #[must_use]
    pub const fn last_received(&self) -> Tick {
        self.last
    }

    #[must_use]
    pub const fn mask(&self) -> u64 {
        self.mask
    }

    /// Marks `tick` as received. Ticks older than the window are ignored.
    pub fn record(&mut self, tick: Tick) {
        if !tick.is_valid() {
            return;
        }
        if !self.last.is_valid() {
            self.last = tick;
            self.mask = 1;
            return;
        }
        match tick.ticks_since(self.last) {
            Some(ahead) if ahead > 0 => {
                let shift = ahead as u32;
                self.mask = if shift >= ACK_WINDOW {
                    1
                } else {
                    (self.mask << shift) | 1
                };
                self.last = tick;
            }
            Some(behind) => {
                let back = behind.unsigned_abs();
                if back < ACK_WINDOW {
                    self.mask |= 1 << back;
                }
            }
            None => {}
        }
    }

    /// Returns `true` if `tick` is inside the window and was received.
    #[must_use]
    pub fn is_acked(&self, tick: Tick) -> bool {
        match self.last.ticks_since(tick) {
            Some(back) if back >= 0 && (back as u32) < ACK_WINDOW => {
                self.mask & (1 << back) != 0
            }
            _ => false,
        }
    }

    /// Folds another ack into this one.
    pub fn merge(&mut self, other: &Self) {
        for back in (0..ACK_WINDOW).rev() {
            if other.mask & (1 << back) != 0 {
                self.record(other.last.subtract(back));
            }
        }
    }

    /// Newest acked tick strictly older than `before`, if any.
    #[must_use]
    pub fn newest_acked_before(&self, before: Tick) -> Option<Tick> {
        (0..ACK_WINDOW)
            .map(|back| self.last.subtract(back))
            .find(|tick| before.is_newer_than(*tick) && self.is_acked(*tick))
    }
}

/// A decoded ack packet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AckPacket {
    pub ack: AckState,
    /// Entities the client wants as full slices.
    pub resync: Vec<EntityId>,
}

/// Encodes an ack packet into `out`, returning its length.
pub fn encode_ack_packet(
    registry: &CodecRegistry,
    ack: &AckState,
    resync: &[EntityId],
    limits: &CodecLimits,
    out: &mut [u8],
) -> CodecResult<usize> {
    if out.len() < HEADER_SIZE {
        return Err(too_small(HEADER_SIZE, out.len()));
    }
    if resync.len() > limits.max_resync_requests {
        return Err(CodecError::LimitsExceeded {
            kind: LimitKind::ResyncRequests,
            limit: limits.max_resync_requests,
            actual: resync.len(),
        });
    }
    let model = registry.model();
    let mut offset = HEADER_SIZE;
    offset += write_section(SectionTag::Ack, &mut out[offset..], |writer| {
        writer.write_bits(ack.mask, 64)?;
        writer.write_packed_uint(resync.len() as u32, model)?;
        for entity in resync {
            writer.write_packed_uint(entity.raw(), model)?;
        }
        Ok(())
    })?;

    let tick = ack.last.raw().unwrap_or(0);
    let header = PacketHeader::ack(registry.schema_hash(), tick, (offset - HEADER_SIZE) as u32);
    encode_header(&header, &mut out[..HEADER_SIZE])?;
    Ok(offset)
}

/// Largest encoded ack packet for `resync_count` requests.
#[must_use]
pub fn max_ack_packet_len(resync_count: usize) -> usize {
    // Packed values take at most 41 bits.
    HEADER_SIZE + crate::packet::SECTION_OVERHEAD + 8 + 6 * (resync_count + 1)
}

/// Decodes an ack packet.
pub fn decode_ack_packet(
    registry: &CodecRegistry,
    bytes: &[u8],
    wire_limits: &wire::Limits,
    limits: &CodecLimits,
) -> CodecResult<AckPacket> {
    let packet = decode_packet(bytes, wire_limits)?;
    let header = packet.header;
    if !header.flags.is_ack() {
        return Err(CodecError::UnexpectedPacket { expected: "ack" });
    }
    if header.schema_hash != registry.schema_hash() {
        return Err(CodecError::SchemaMismatch {
            expected: registry.schema_hash(),
            found: header.schema_hash,
        });
    }

    let mut decoded = None;
    for section in &packet.sections {
        match section.tag {
            SectionTag::Ack => {
                if decoded.is_some() {
                    return Err(CodecError::DuplicateSection {
                        section: section.tag,
                    });
                }
                decoded = Some(decode_ack_body(
                    section.body,
                    header.tick,
                    registry.model(),
                    limits,
                )?);
            }
            _ => return Err(CodecError::UnexpectedPacket { expected: "ack" }),
        }
    }
    Ok(decoded.unwrap_or_default())
}

fn decode_ack_body(
    body: &[u8],
    tick: u32,
    model: &CompressionModel,
    limits: &CodecLimits,
) -> CodecResult<AckPacket> {
    let mut reader = BitReader::new(body);
    let mask = reader.read_bits(64)?;
    let count = reader.read_packed_uint(model)? as usize;
    if count > limits.max_resync_requests {
        return Err(CodecError::LimitsExceeded {
            kind: LimitKind::ResyncRequests,
            limit: limits.max_resync_requests,
            actual: count,
        });
    }
    let mut resync = Vec::with_capacity(count);
    for _ in 0..count {
        resync.push(EntityId::new(reader.read_packed_uint(model)?));
    }
    ensure_consumed(&mut reader, SectionTag::Ack)?;

    // The newest tick always has bit 0 set; without it nothing was received.
    let ack = if mask & 1 == 0 {
        AckState::default()
    } else {
        AckState {
            last: Tick::new(tick),
            mask,
        }
    };
    Ok(AckPacket { ack, resync })
}
