//! Snapshot packet framing: despawn and ghost sections, per-ghost slices.
//!
//! ```text
//! despawn body:  [count packed] ([entity raw32][spawn tick raw32])*
//! ghost body:    [count raw16] slice*
//! full slice:    [0 packed][entity raw32][spawn tick raw32][ghost type raw16]
//! delta slice:   [baseline distance packed][entity packed][predict distance packed]
//! then:          [body bits raw16][change mask][changed fields]
//! ```
//!
//! Distances count ticks back from the packet tick; a predict distance of
//! zero means the baseline alone is the delta reference. The body length lets
//! a receiver skip a slice it cannot decode and keep the rest of the packet.

use bitstream::{BitCheckpoint, BitReader, BitWriter, CompressionModel};
use schema::GhostTypeId;
use wire::{
    decode_packet, encode_header, varu32_len, write_varu32, EncodeError, PacketHeader, SectionTag,
    HEADER_SIZE,
};

use crate::change_mask::ChangeMask;
use crate::error::{CodecError, CodecResult, LimitKind, MismatchReason};
use crate::limits::CodecLimits;
use crate::registry::{CodecRegistry, GhostTypeCodec};
use crate::snapshot::{read_ghost_fields, write_ghost_fields, Baseline, SnapshotData};
use crate::{EntityId, GhostId, Tick};

const VARINT_MAX_BYTES: usize = 5;

/// Bytes a section adds around its body.
pub const SECTION_OVERHEAD: usize = 1 + VARINT_MAX_BYTES;

/// Largest slice body the raw16 length prefix can describe.
pub const MAX_SLICE_BITS: usize = u16::MAX as usize;

/// Writes a section whose body is produced by `write_body`.
///
/// The body is written in place after a maximum-size length prefix and moved
/// down once its length is known.
pub(crate) fn write_section<F>(tag: SectionTag, out: &mut [u8], write_body: F) -> CodecResult<usize>
where
    F: FnOnce(&mut BitWriter<'_>) -> CodecResult<()>,
{
    if out.len() < SECTION_OVERHEAD {
        return Err(too_small(SECTION_OVERHEAD, out.len()));
    }

    let body_start = SECTION_OVERHEAD;
    let mut writer = BitWriter::new(&mut out[body_start..]);
    write_body(&mut writer)?;
    let body_len = writer.finish();

    let len_u32 = u32::try_from(body_len)
        .map_err(|_| CodecError::WireEncode(EncodeError::LengthOverflow { length: body_len }))?;
    let len_bytes = varu32_len(len_u32);
    let total_needed = 1 + len_bytes + body_len;

    out[0] = tag as u8;
    write_varu32(len_u32, &mut out[1..1 + len_bytes]);
    let shift = VARINT_MAX_BYTES - len_bytes;
    if shift > 0 {
        let src = body_start..body_start + body_len;
        out.copy_within(src, 1 + len_bytes);
    }
    Ok(total_needed)
}

pub(crate) fn too_small(needed: usize, available: usize) -> CodecError {
    CodecError::WireEncode(EncodeError::BufferTooSmall { needed, available })
}

/// Fails with [`CodecError::TrailingSectionData`] unless only byte padding is left.
pub(crate) fn ensure_consumed(reader: &mut BitReader<'_>, section: SectionTag) -> CodecResult<()> {
    reader.align_to_byte()?;
    let remaining_bits = reader.bits_remaining();
    if remaining_bits != 0 {
        return Err(CodecError::TrailingSectionData {
            section,
            remaining_bits,
        });
    }
    Ok(())
}

/// Writes a despawn section body.
pub fn encode_despawn_body(
    ghosts: &[GhostId],
    model: &CompressionModel,
    writer: &mut BitWriter<'_>,
) -> CodecResult<()> {
    let count = u32::try_from(ghosts.len()).map_err(|_| CodecError::LimitsExceeded {
        kind: LimitKind::Despawns,
        limit: u32::MAX as usize,
        actual: ghosts.len(),
    })?;
    writer.write_packed_uint(count, model)?;
    for ghost in ghosts {
        writer.write_raw_bits(ghost.entity.raw(), 32)?;
        writer.write_raw_bits(ghost.spawn_tick.require("despawn spawn tick")?, 32)?;
    }
    Ok(())
}

/// Reads a despawn section body.
pub fn decode_despawn_body(
    body: &[u8],
    model: &CompressionModel,
    limits: &CodecLimits,
) -> CodecResult<Vec<GhostId>> {
    let mut reader = BitReader::new(body);
    let count = reader.read_packed_uint(model)? as usize;
    if count > limits.max_despawns_per_packet {
        return Err(CodecError::LimitsExceeded {
            kind: LimitKind::Despawns,
            limit: limits.max_despawns_per_packet,
            actual: count,
        });
    }
    let mut ghosts = Vec::with_capacity(count);
    for _ in 0..count {
        let entity = EntityId::new(reader.read_raw_bits(32)?);
        let spawn_tick = Tick::new(reader.read_raw_bits(32)?);
        ghosts.push(GhostId::new(entity, spawn_tick));
    }
    ensure_consumed(&mut reader, SectionTag::GhostDespawn)?;
    Ok(ghosts)
}

/// Writes ghost slices into a ghost section body.
///
/// Every slice is written atomically: on error the section is left exactly as
/// it was, so a caller can defer the ghost and try the next one.
#[derive(Debug)]
pub struct GhostSectionWriter<'w, 'b> {
    writer: &'w mut BitWriter<'b>,
    registry: &'w CodecRegistry,
    limits: &'w CodecLimits,
    tick: Tick,
    count_at: BitCheckpoint,
    count: usize,
}

impl<'w, 'b> GhostSectionWriter<'w, 'b> {
    /// Starts a ghost section for the packet at `tick`.
    pub fn new(
        writer: &'w mut BitWriter<'b>,
        registry: &'w CodecRegistry,
        limits: &'w CodecLimits,
        tick: Tick,
    ) -> CodecResult<Self> {
        tick.require("snapshot tick")?;
        let count_at = writer.checkpoint();
        writer.write_raw_bits(0, 16)?;
        Ok(Self {
            writer,
            registry,
            limits,
            tick,
            count_at,
            count: 0,
        })
    }

    /// Number of slices written so far.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Bits left in the underlying buffer.
    #[must_use]
    pub fn remaining_bits(&self) -> usize {
        self.writer.remaining_bits()
    }

    /// Writes one ghost.
    ///
    /// Without a baseline the slice is full: it carries the spawn tick and
    /// ghost type and every field. `older` is only used with a baseline.
    pub fn write_slice(
        &mut self,
        ghost: GhostId,
        current: &SnapshotData,
        baseline: Option<Baseline<'_>>,
        older: Option<Baseline<'_>>,
    ) -> CodecResult<ChangeMask> {
        let max_ghosts = self.limits.max_ghosts_per_packet.min(usize::from(u16::MAX));
        if self.count >= max_ghosts {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::GhostsPerPacket,
                limit: max_ghosts,
                actual: self.count + 1,
            });
        }
        let registry = self.registry;
        let codec = registry.ghost_type(current.ghost_type())?;
        let start = self.writer.checkpoint();
        match self.write_slice_inner(codec, ghost, current, baseline, older) {
            Ok(mask) => {
                self.count += 1;
                Ok(mask)
            }
            Err(err) => {
                self.writer.rewind(start);
                Err(err)
            }
        }
    }

    fn write_slice_inner(
        &mut self,
        codec: &GhostTypeCodec,
        ghost: GhostId,
        current: &SnapshotData,
        baseline: Option<Baseline<'_>>,
        older: Option<Baseline<'_>>,
    ) -> CodecResult<ChangeMask> {
        let model = self.registry.model();
        let w = &mut *self.writer;
        let older = match baseline {
            None => {
                w.write_packed_uint(0, model)?;
                w.write_raw_bits(ghost.entity.raw(), 32)?;
                w.write_raw_bits(ghost.spawn_tick.require("ghost spawn tick")?, 32)?;
                w.write_raw_bits(u32::from(codec.id.get()), 16)?;
                None
            }
            Some((base_tick, _)) => {
                let base_distance = distance_to(self.tick, base_tick)?;
                let older = older.filter(|(tick, _)| base_tick.is_newer_than(*tick));
                let predict_distance = match older {
                    Some((tick, _)) => distance_to(self.tick, tick)?,
                    None => 0,
                };
                w.write_packed_uint(base_distance, model)?;
                w.write_packed_uint(ghost.entity.raw(), model)?;
                w.write_packed_uint(predict_distance, model)?;
                older
            }
        };

        let len_at = w.checkpoint();
        w.write_raw_bits(0, 16)?;
        let body_start = w.bits_written();
        let mask = write_ghost_fields(codec, self.tick, current, baseline, older, model, w)?;
        let body_bits = w.bits_written() - body_start;
        let max_bits = self.limits.max_slice_bits.min(MAX_SLICE_BITS);
        if body_bits > max_bits {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::SliceBits,
                limit: max_bits,
                actual: body_bits,
            });
        }
        w.patch_raw_bits(len_at, body_bits as u32, 16)?;
        Ok(mask)
    }

    /// Writes the final slice count.
    pub fn finish(self) -> CodecResult<usize> {
        self.writer
            .patch_raw_bits(self.count_at, self.count as u32, 16)?;
        Ok(self.count)
    }
}

fn distance_to(target: Tick, tick: Tick) -> CodecResult<u32> {
    match target.ticks_since(tick) {
        Some(distance) if distance > 0 => Ok(distance as u32),
        _ => Err(CodecError::InvalidTick {
            context: "baseline must precede the snapshot tick",
        }),
    }
}

/// How a slice is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceKind {
    /// Every field against zero, for a new or resynced ghost.
    Full {
        spawn_tick: Tick,
        ghost_type: GhostTypeId,
    },
    /// Changed fields against an earlier snapshot.
    Delta {
        baseline_distance: u32,
        predict_distance: u32,
    },
}

/// Everything before a slice's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHeader {
    pub entity: EntityId,
    pub kind: SliceKind,
    pub body_bits: u16,
}

impl SliceHeader {
    #[must_use]
    pub const fn is_full(&self) -> bool {
        matches!(self.kind, SliceKind::Full { .. })
    }

    /// Tick of the delta baseline, relative to the packet tick.
    #[must_use]
    pub fn baseline_tick(&self, tick: Tick) -> Option<Tick> {
        match self.kind {
            SliceKind::Delta {
                baseline_distance, ..
            } => Some(tick.subtract(baseline_distance)),
            SliceKind::Full { .. } => None,
        }
    }

    /// Tick of the older prediction baseline, if the slice was predicted.
    #[must_use]
    pub fn predict_tick(&self, tick: Tick) -> Option<Tick> {
        match self.kind {
            SliceKind::Delta {
                predict_distance, ..
            } if predict_distance != 0 => Some(tick.subtract(predict_distance)),
            _ => None,
        }
    }
}

/// Iterates over the slices of a ghost section body.
///
/// Call [`next_header`](Self::next_header), then either
/// [`read_body`](Self::read_body) or [`skip_body`](Self::skip_body). A body
/// left unread is skipped by the next call.
#[derive(Debug, Clone)]
pub struct GhostSectionReader<'a> {
    reader: BitReader<'a>,
    remaining: usize,
    pending_body: Option<u16>,
}

impl<'a> GhostSectionReader<'a> {
    /// Reads the slice count of a ghost section body.
    pub fn new(body: &'a [u8], limits: &CodecLimits) -> CodecResult<Self> {
        let mut reader = BitReader::new(body);
        let count = reader.read_raw_bits(16)? as usize;
        if count > limits.max_ghosts_per_packet {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::GhostsPerPacket,
                limit: limits.max_ghosts_per_packet,
                actual: count,
            });
        }
        Ok(Self {
            reader,
            remaining: count,
            pending_body: None,
        })
    }

    /// A reader over a packet without a ghost section.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            reader: BitReader::new(&[]),
            remaining: 0,
            pending_body: None,
        }
    }

    /// Slices not yet started.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    /// Reads the next slice header, or `None` when every slice was read.
    pub fn next_header(&mut self, model: &CompressionModel) -> CodecResult<Option<SliceHeader>> {
        self.skip_body()?;
        if self.remaining == 0 {
            return Ok(None);
        }
        let r = &mut self.reader;
        let baseline_distance = r.read_packed_uint(model)?;
        let (entity, kind) = if baseline_distance == 0 {
            let entity = EntityId::new(r.read_raw_bits(32)?);
            let spawn_tick = Tick::new(r.read_raw_bits(32)?);
            let ghost_type = GhostTypeId::new(r.read_raw_bits(16)? as u16);
            (
                entity,
                SliceKind::Full {
                    spawn_tick,
                    ghost_type,
                },
            )
        } else {
            let entity = EntityId::new(r.read_packed_uint(model)?);
            let predict_distance = r.read_packed_uint(model)?;
            (
                entity,
                SliceKind::Delta {
                    baseline_distance,
                    predict_distance,
                },
            )
        };
        let body_bits = r.read_raw_bits(16)? as u16;
        self.remaining -= 1;
        self.pending_body = Some(body_bits);
        Ok(Some(SliceHeader {
            entity,
            kind,
            body_bits,
        }))
    }

    /// Decodes the current slice body against the given baselines.
    ///
    /// The section stays aligned on the next slice whatever the outcome. A
    /// body that fails to decode, or does not fill exactly its declared
    /// length, is reported as a [`CodecError::DecodeMismatch`].
    pub fn read_body(
        &mut self,
        header: &SliceHeader,
        codec: &GhostTypeCodec,
        tick: Tick,
        baseline: Option<Baseline<'_>>,
        older: Option<Baseline<'_>>,
        model: &CompressionModel,
    ) -> CodecResult<SnapshotData> {
        let mut body = self.reader.clone();
        let start = body.bit_position();
        let result = read_ghost_fields(codec, tick, baseline, older, model, &mut body);
        self.skip_body()?;

        let declared = usize::from(header.body_bits);
        let consumed = body.bit_position() - start;
        match result {
            Ok(data) if consumed == declared => Ok(data),
            _ => Err(CodecError::DecodeMismatch {
                entity: header.entity,
                reason: MismatchReason::SliceLength { declared, consumed },
            }),
        }
    }

    /// Skips the current slice body, if one is pending.
    pub fn skip_body(&mut self) -> CodecResult<()> {
        if let Some(bits) = self.pending_body.take() {
            self.reader.skip_bits(usize::from(bits))?;
        }
        Ok(())
    }

    /// Checks that every slice was consumed and nothing follows them.
    pub fn finish(mut self) -> CodecResult<()> {
        self.skip_body()?;
        if self.remaining != 0 {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::GhostsPerPacket,
                limit: 0,
                actual: self.remaining,
            });
        }
        ensure_consumed(&mut self.reader, SectionTag::GhostSnapshot)
    }
}

/// Encodes a snapshot packet into `out`, whose length is the byte budget.
///
/// Despawns are written first. `write_ghosts` then fills whatever space is
/// left through a [`GhostSectionWriter`]. Returns the packet length.
pub fn encode_snapshot_packet<F>(
    registry: &CodecRegistry,
    tick: Tick,
    despawns: &[GhostId],
    limits: &CodecLimits,
    out: &mut [u8],
    write_ghosts: F,
) -> CodecResult<usize>
where
    F: FnOnce(&mut GhostSectionWriter<'_, '_>) -> CodecResult<()>,
{
    let raw_tick = tick.require("snapshot tick")?;
    if out.len() < HEADER_SIZE {
        return Err(too_small(HEADER_SIZE, out.len()));
    }
    if despawns.len() > limits.max_despawns_per_packet {
        return Err(CodecError::LimitsExceeded {
            kind: LimitKind::Despawns,
            limit: limits.max_despawns_per_packet,
            actual: despawns.len(),
        });
    }

    let model = registry.model();
    let mut offset = HEADER_SIZE;
    if !despawns.is_empty() {
        offset += write_section(SectionTag::GhostDespawn, &mut out[offset..], |writer| {
            encode_despawn_body(despawns, model, writer)
        })?;
    }
    offset += write_section(SectionTag::GhostSnapshot, &mut out[offset..], |writer| {
        let mut section = GhostSectionWriter::new(writer, registry, limits, tick)?;
        write_ghosts(&mut section)?;
        section.finish()?;
        Ok(())
    })?;

    let payload_len = offset - HEADER_SIZE;
    let header = PacketHeader::snapshot(registry.schema_hash(), raw_tick, payload_len as u32);
    encode_header(&header, &mut out[..HEADER_SIZE])?;
    Ok(offset)
}

/// A decoded snapshot packet whose ghost slices are read lazily.
#[derive(Debug, Clone)]
pub struct SnapshotPacket<'a> {
    pub tick: Tick,
    pub despawns: Vec<GhostId>,
    pub ghosts: GhostSectionReader<'a>,
}

/// Validates a snapshot packet and decodes its despawn list.
pub fn decode_snapshot_packet<'a>(
    registry: &CodecRegistry,
    bytes: &'a [u8],
    wire_limits: &wire::Limits,
    limits: &CodecLimits,
) -> CodecResult<SnapshotPacket<'a>> {
    let packet = decode_packet(bytes, wire_limits)?;
    let header = packet.header;
    if !header.flags.is_snapshot() {
        return Err(CodecError::UnexpectedPacket {
            expected: "snapshot",
        });
    }
    if header.schema_hash != registry.schema_hash() {
        return Err(CodecError::SchemaMismatch {
            expected: registry.schema_hash(),
            found: header.schema_hash,
        });
    }

    let mut despawns = None;
    let mut ghosts = None;
    for section in &packet.sections {
        match section.tag {
            SectionTag::GhostDespawn => {
                if despawns.is_some() {
                    return Err(CodecError::DuplicateSection {
                        section: section.tag,
                    });
                }
                despawns = Some(decode_despawn_body(section.body, registry.model(), limits)?);
            }
            SectionTag::GhostSnapshot => {
                if ghosts.is_some() {
                    return Err(CodecError::DuplicateSection {
                        section: section.tag,
                    });
                }
                ghosts = Some(GhostSectionReader::new(section.body, limits)?);
            }
            _ => {
                return Err(CodecError::UnexpectedPacket {
                    expected: "snapshot",
                })
            }
        }
    }

    Ok(SnapshotPacket {
        tick: Tick::new(header.tick),
        despawns: despawns.unwrap_or_default(),
        ghosts: ghosts.unwrap_or_else(GhostSectionReader::empty),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_from_values;
    use crate::FieldValue;
    use schema::{FieldDef, FieldKind, GhostTypeDef, Schema};

    const CRATE: GhostTypeId = GhostTypeId::new(3);

    fn registry() -> CodecRegistry {
        let schema = Schema::new(vec![GhostTypeDef::new(CRATE, "crate")
            .field(FieldDef::new("hp", FieldKind::Int))
            .field(FieldDef::new("height", FieldKind::Float).quantized(100))])
        .unwrap();
        CodecRegistry::new(&schema).unwrap()
    }

    fn data(registry: &CodecRegistry, hp: i32, height: f32) -> SnapshotData {
        let codec = registry.ghost_type(CRATE).unwrap();
        snapshot_from_values(codec, &[FieldValue::Int(hp), FieldValue::Float(height)]).unwrap()
    }

    fn ghost(id: u32) -> GhostId {
        GhostId::new(EntityId::new(id), Tick::new(1))
    }

    #[test]
    fn packet_roundtrip_full_and_delta() {
        let registry = registry();
        let limits = CodecLimits::default();
        let base = data(&registry, 10, 1.0);
        let full = data(&registry, 10, 1.0);
        let next = data(&registry, 9, 1.0);
        let mut buf = [0u8; 256];
        let len = encode_snapshot_packet(
            &registry,
            Tick::new(20),
            &[ghost(9)],
            &limits,
            &mut buf,
            |section| {
                section.write_slice(ghost(1), &full, None, None)?;
                section.write_slice(ghost(2), &next, Some((Tick::new(18), &base)), None)?;
                Ok(())
            },
        )
        .unwrap();

        let packet =
            decode_snapshot_packet(&registry, &buf[..len], &wire::Limits::default(), &limits)
                .unwrap();
        assert_eq!(packet.tick, Tick::new(20));
        assert_eq!(packet.despawns, vec![ghost(9)]);

        let codec = registry.ghost_type(CRATE).unwrap();
        let model = registry.model();
        let mut ghosts = packet.ghosts;
        assert_eq!(ghosts.remaining(), 2);

        let first = ghosts.next_header(model).unwrap().unwrap();
        assert_eq!(
            first.kind,
            SliceKind::Full {
                spawn_tick: Tick::new(1),
                ghost_type: CRATE
            }
        );
        let decoded = ghosts
            .read_body(&first, codec, Tick::new(20), None, None, model)
            .unwrap();
        assert_eq!(decoded.words(), full.words());

        let second = ghosts.next_header(model).unwrap().unwrap();
        assert_eq!(second.entity, EntityId::new(2));
        assert_eq!(second.baseline_tick(Tick::new(20)), Some(Tick::new(18)));
        assert_eq!(second.predict_tick(Tick::new(20)), None);
        let decoded = ghosts
            .read_body(
                &second,
                codec,
                Tick::new(20),
                Some((Tick::new(18), &base)),
                None,
                model,
            )
            .unwrap();
        assert_eq!(decoded.words(), next.words());
        assert!(ghosts.next_header(model).unwrap().is_none());
        ghosts.finish().unwrap();
    }

    #[test]
    fn skipped_slice_keeps_section_aligned() {
        let registry = registry();
        let limits = CodecLimits::default();
        let a = data(&registry, 1, 2.0);
        let b = data(&registry, 3, 4.0);
        let mut buf = [0u8; 128];
        let len = encode_snapshot_packet(&registry, Tick::new(5), &[], &limits, &mut buf, |s| {
            s.write_slice(ghost(1), &a, None, None)?;
            s.write_slice(ghost(2), &b, None, None)?;
            Ok(())
        })
        .unwrap();
        let packet =
            decode_snapshot_packet(&registry, &buf[..len], &wire::Limits::default(), &limits)
                .unwrap();
        let model = registry.model();
        let codec = registry.ghost_type(CRATE).unwrap();
        let mut ghosts = packet.ghosts;
        let _ = ghosts.next_header(model).unwrap().unwrap();
        let second = ghosts.next_header(model).unwrap().unwrap();
        assert_eq!(second.entity, EntityId::new(2));
        let decoded = ghosts
            .read_body(&second, codec, Tick::new(5), None, None, model)
            .unwrap();
        assert_eq!(decoded.words(), b.words());
        ghosts.finish().unwrap();
    }

    #[test]
    fn body_decoded_with_other_layout_is_a_mismatch() {
        let registry = registry();
        let limits = CodecLimits::default();
        let base = data(&registry, 100, 0.0);
        let current = data(&registry, 7, 3.5);
        let mut buf = [0u8; 128];
        let len = encode_snapshot_packet(&registry, Tick::new(5), &[], &limits, &mut buf, |s| {
            s.write_slice(ghost(1), &current, Some((Tick::new(4), &base)), None)?;
            Ok(())
        })
        .unwrap();
        let packet =
            decode_snapshot_packet(&registry, &buf[..len], &wire::Limits::default(), &limits)
                .unwrap();

        // Same change bits, but `hp` is a long and reads two packed halves.
        let other = CodecRegistry::new(
            &Schema::new(vec![GhostTypeDef::new(CRATE, "crate")
                .field(FieldDef::new("hp", FieldKind::Long))
                .field(FieldDef::new("height", FieldKind::Float).quantized(100))])
            .unwrap(),
        )
        .unwrap();
        let other_codec = other.ghost_type(CRATE).unwrap();
        let other_base = SnapshotData::zeroed(other_codec);

        let model = registry.model();
        let mut ghosts = packet.ghosts;
        let header = ghosts.next_header(model).unwrap().unwrap();
        let err = ghosts
            .read_body(
                &header,
                other_codec,
                Tick::new(5),
                Some((Tick::new(4), &other_base)),
                None,
                model,
            )
            .unwrap_err();
        assert!(err.is_decode_mismatch());
        ghosts.finish().unwrap();
    }

    #[test]
    fn overflowing_slice_is_rolled_back() {
        let registry = registry();
        let limits = CodecLimits::default();
        let a = data(&registry, 1, 2.0);
        let mut buf = [0u8; HEADER_SIZE + SECTION_OVERHEAD + 40];
        let mut written = 0;
        let mut failures = 0;
        let len = encode_snapshot_packet(&registry, Tick::new(5), &[], &limits, &mut buf, |s| {
            for id in 0..10 {
                match s.write_slice(ghost(id), &a, None, None) {
                    Ok(_) => written += 1,
                    Err(err) if err.is_stream_overflow() => failures += 1,
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        })
        .unwrap();
        assert!(written >= 1 && written < 10);
        assert_eq!(written + failures, 10);

        let packet =
            decode_snapshot_packet(&registry, &buf[..len], &wire::Limits::default(), &limits)
                .unwrap();
        assert_eq!(packet.ghosts.remaining(), written);
    }

    #[test]
    fn delta_baseline_must_be_older() {
        let registry = registry();
        let limits = CodecLimits::default();
        let a = data(&registry, 1, 2.0);
        let mut buf = [0u8; 128];
        let err = encode_snapshot_packet(&registry, Tick::new(5), &[], &limits, &mut buf, |s| {
            s.write_slice(ghost(1), &a, Some((Tick::new(5), &a)), None)?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidTick { .. }));
    }

    #[test]
    fn ghost_limit_enforced() {
        let registry = registry();
        let limits = CodecLimits {
            max_ghosts_per_packet: 1,
            ..CodecLimits::default()
        };
        let a = data(&registry, 1, 2.0);
        let mut buf = [0u8; 128];
        let len = encode_snapshot_packet(&registry, Tick::new(5), &[], &limits, &mut buf, |s| {
            s.write_slice(ghost(1), &a, None, None)?;
            let err = s.write_slice(ghost(2), &a, None, None).unwrap_err();
            assert!(matches!(
                err,
                CodecError::LimitsExceeded {
                    kind: LimitKind::GhostsPerPacket,
                    ..
                }
            ));
            Ok(())
        })
        .unwrap();
        assert!(len > HEADER_SIZE);
    }

    #[test]
    fn decode_rejects_schema_mismatch_and_ack_packets() {
        let registry = registry();
        let limits = CodecLimits::default();
        let mut buf = [0u8; 64];
        let len =
            encode_snapshot_packet(&registry, Tick::new(5), &[], &limits, &mut buf, |_| Ok(()))
                .unwrap();
        let other = CodecRegistry::new(
            &Schema::new(vec![GhostTypeDef::new(CRATE, "barrel")
                .field(FieldDef::new("hp", FieldKind::Int))])
            .unwrap(),
        )
        .unwrap();
        let err = decode_snapshot_packet(&other, &buf[..len], &wire::Limits::default(), &limits)
            .unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch { .. }));

        let header = PacketHeader::ack(registry.schema_hash(), 5, 0);
        let mut ack = [0u8; HEADER_SIZE];
        encode_header(&header, &mut ack).unwrap();
        let err = decode_snapshot_packet(&registry, &ack, &wire::Limits::default(), &limits)
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::UnexpectedPacket {
                expected: "snapshot"
            }
        );
    }

    #[test]
    fn despawn_limit_enforced_on_decode() {
        let registry = registry();
        let mut buf = [0u8; 64];
        let mut writer = BitWriter::new(&mut buf);
        encode_despawn_body(&[ghost(1), ghost(2)], registry.model(), &mut writer).unwrap();
        let len = writer.finish();
        let limits = CodecLimits {
            max_despawns_per_packet: 1,
            ..CodecLimits::default()
        };
        let err = decode_despawn_body(&buf[..len], registry.model(), &limits).unwrap_err();
        assert!(matches!(
            err,
            CodecError::LimitsExceeded {
                kind: LimitKind::Despawns,
                ..
            }
        ));
    }
}
