//! Packet inspection.

use std::fmt::Write as _;

use anyhow::{bail, Context, Result};
use bitstream::CompressionModel;
use codec::{
    decode_ack_packet, decode_despawn_body, CodecLimits, CodecRegistry, FieldValue,
    GhostId, GhostSectionReader, SliceKind, Tick,
};
use serde::Serialize;
use serde_json::{json, Value};
use wire::SectionTag;

/// Which kind of packet was inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketKind {
    Snapshot,
    Ack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionReport {
    pub tag: String,
    pub byte_len: usize,
}

/// A ghost identity as printed in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GhostReport {
    pub entity: u32,
    pub spawn_tick: Option<u32>,
}

impl From<GhostId> for GhostReport {
    fn from(ghost: GhostId) -> Self {
        Self {
            entity: ghost.entity.raw(),
            spawn_tick: ghost.spawn_tick.raw(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldReport {
    pub name: String,
    pub value: Value,
}

/// One ghost slice of a snapshot packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceReport {
    pub entity: u32,
    pub full: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ghost_type: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn_tick: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_tick: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predict_tick: Option<u32>,
    pub body_bits: u16,
    /// Decoded values; only full slices can be decoded without baselines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldReport>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AckReport {
    pub last_received: Option<u32>,
    pub mask: u64,
    pub resync: Vec<u32>,
}

/// Everything the inspector learned about one packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectReport {
    pub kind: PacketKind,
    pub version: u16,
    pub flags: u16,
    pub schema_hash: u64,
    /// `None` when no schema was supplied.
    pub schema_matches: Option<bool>,
    pub tick: u32,
    pub payload_len: u32,
    pub sections: Vec<SectionReport>,
    pub despawns: Vec<GhostReport>,
    pub slices: Vec<SliceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<AckReport>,
}

/// Decodes a packet into an [`InspectReport`].
///
/// Slice headers are read with the registry's compression model, or the
/// default one without a registry. Field values and ack contents need a
/// registry whose schema hash matches the packet.
pub fn inspect_packet(
    bytes: &[u8],
    registry: Option<&CodecRegistry>,
    wire_limits: &wire::Limits,
    limits: &CodecLimits,
) -> Result<InspectReport> {
    let packet = wire::decode_packet(bytes, wire_limits).context("decode packet framing")?;
    let header = packet.header;
    let kind = if header.flags.is_snapshot() {
        PacketKind::Snapshot
    } else if header.flags.is_ack() {
        PacketKind::Ack
    } else {
        bail!("packet flags 0x{:04x} name no packet kind", header.flags.raw());
    };
    let schema_matches = registry.map(|r| r.schema_hash() == header.schema_hash);
    let decoder = registry.filter(|_| schema_matches == Some(true));
    let default_model = CompressionModel::default();
    let model = registry.map_or(&default_model, CodecRegistry::model);

    let mut report = InspectReport {
        kind,
        version: header.version,
        flags: header.flags.raw(),
        schema_hash: header.schema_hash,
        schema_matches,
        tick: header.tick,
        payload_len: header.payload_len,
        sections: Vec::new(),
        despawns: Vec::new(),
        slices: Vec::new(),
        ack: None,
    };

    let tick = Tick::new(header.tick);
    for section in &packet.sections {
        report.sections.push(SectionReport {
            tag: format!("{:?}", section.tag),
            byte_len: section.body.len(),
        });
        match section.tag {
            SectionTag::GhostDespawn => {
                let despawns = decode_despawn_body(section.body, model, limits)
                    .context("decode despawn section")?;
                report.despawns = despawns.into_iter().map(GhostReport::from).collect();
            }
            SectionTag::GhostSnapshot => {
                report.slices = inspect_slices(section.body, tick, model, decoder, limits)?;
            }
            _ => {}
        }
    }

    if kind == PacketKind::Ack {
        if let Some(registry) = decoder {
            let ack = decode_ack_packet(registry, bytes, wire_limits, limits)
                .context("decode ack packet")?;
            report.ack = Some(AckReport {
                last_received: ack.ack.last_received().raw(),
                mask: ack.ack.mask(),
                resync: ack.resync.iter().map(|e| e.raw()).collect(),
            });
        }
    }
    Ok(report)
}

fn inspect_slices(
    body: &[u8],
    tick: Tick,
    model: &CompressionModel,
    registry: Option<&CodecRegistry>,
    limits: &CodecLimits,
) -> Result<Vec<SliceReport>> {
    let mut reader = GhostSectionReader::new(body, limits).context("decode ghost section")?;
    let mut slices = Vec::new();
    while let Some(header) = reader.next_header(model).context("decode slice header")? {
        let mut slice = SliceReport {
            entity: header.entity.raw(),
            full: header.is_full(),
            ghost_type: None,
            spawn_tick: None,
            baseline_tick: header.baseline_tick(tick).and_then(Tick::raw),
            predict_tick: header.predict_tick(tick).and_then(Tick::raw),
            body_bits: header.body_bits,
            fields: None,
        };
        if let SliceKind::Full {
            spawn_tick,
            ghost_type,
        } = header.kind
        {
            slice.ghost_type = Some(ghost_type.get());
            slice.spawn_tick = spawn_tick.raw();
            if let Some(registry) = registry {
                let codec = registry.ghost_type(ghost_type)?;
                let data = reader
                    .read_body(&header, codec, tick, None, None, model)
                    .with_context(|| format!("decode full slice of entity {}", header.entity))?;
                let fields = codec
                    .fields()
                    .iter()
                    .zip(data.values(codec))
                    .map(|(field, value)| FieldReport {
                        name: field.name.clone(),
                        value: value_json(&value),
                    })
                    .collect();
                slice.fields = Some(fields);
            }
        }
        slices.push(slice);
    }
    reader.finish().context("ghost section trailer")?;
    Ok(slices)
}

fn value_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Bool(v) => json!(v),
        FieldValue::Int(v) => json!(v),
        FieldValue::UInt(v) => json!(v),
        FieldValue::Long(v) => json!(v),
        FieldValue::ULong(v) => json!(v),
        FieldValue::Float(v) => json!(v),
        FieldValue::Double(v) => json!(v),
        FieldValue::Vector2(v) => json!([v.x, v.y]),
        FieldValue::Vector3(v) => json!([v.x, v.y, v.z]),
        FieldValue::Quaternion(q) => json!([q.x, q.y, q.z, q.w]),
        FieldValue::String(s) => json!(s),
        FieldValue::Entity(Some(ghost)) => json!(GhostReport::from(*ghost)),
        FieldValue::Entity(None) => Value::Null,
    }
}

/// Renders a report for terminals.
#[must_use]
pub fn format_report(report: &InspectReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:?} packet, version: {} flags: 0x{:04x} schema_hash: 0x{:016x}",
        report.kind, report.version, report.flags, report.schema_hash
    );
    match report.schema_matches {
        Some(true) => out.push_str("schema: matches\n"),
        Some(false) => out.push_str("schema: MISMATCH, field values not decoded\n"),
        None => {}
    }
    let _ = writeln!(out, "tick: {} payload_len: {} bytes", report.tick, report.payload_len);
    out.push_str("sections:\n");
    for section in &report.sections {
        let _ = writeln!(out, "  {}: {} bytes", section.tag, section.byte_len);
    }
    if !report.despawns.is_empty() {
        out.push_str("despawns:\n");
        for ghost in &report.despawns {
            let spawned = tick_text(ghost.spawn_tick);
            let _ = writeln!(out, "  entity {} spawned at {spawned}", ghost.entity);
        }
    }
    if !report.slices.is_empty() {
        let full = report.slices.iter().filter(|s| s.full).count();
        let _ = writeln!(
            out,
            "slices: {} ({full} full, {} delta)",
            report.slices.len(),
            report.slices.len() - full
        );
    }
    for slice in &report.slices {
        if slice.full {
            let _ = writeln!(
                out,
                "  entity {}: full, type {} spawned at {}, {} bits",
                slice.entity,
                slice.ghost_type.unwrap_or_default(),
                tick_text(slice.spawn_tick),
                slice.body_bits
            );
        } else {
            let _ = write!(
                out,
                "  entity {}: delta vs {}",
                slice.entity,
                tick_text(slice.baseline_tick)
            );
            if let Some(predict) = slice.predict_tick {
                let _ = write!(out, ", predicted from {predict}");
            }
            let _ = writeln!(out, ", {} bits", slice.body_bits);
        }
        for field in slice.fields.iter().flatten() {
            let _ = writeln!(out, "    {}: {}", field.name, field.value);
        }
    }
    if let Some(ack) = &report.ack {
        let _ = writeln!(
            out,
            "ack: last received {} mask 0x{:016x}",
            tick_text(ack.last_received),
            ack.mask
        );
        if !ack.resync.is_empty() {
            let _ = writeln!(out, "resync requested: {:?}", ack.resync);
        }
    }
    out
}

fn tick_text(tick: Option<u32>) -> String {
    tick.map_or_else(|| "-".to_string(), |t| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{
        encode_ack_packet, encode_snapshot_packet, snapshot_from_values, AckState, EntityId,
    };
    use glam::Vec3;
    use schema::{FieldDef, FieldKind, GhostTypeDef, GhostTypeId, Schema};

    const UNIT: GhostTypeId = GhostTypeId::new(7);

    fn registry() -> CodecRegistry {
        let schema = Schema::new(vec![GhostTypeDef::new(UNIT, "unit")
            .field(FieldDef::new("pos", FieldKind::Vector3).quantized(100))
            .field(FieldDef::new("hp", FieldKind::Int))])
        .unwrap();
        CodecRegistry::new(&schema).unwrap()
    }

    fn snapshot_packet(registry: &CodecRegistry) -> Vec<u8> {
        let codec = registry.ghost_type(UNIT).unwrap();
        let data = |hp| {
            snapshot_from_values(
                codec,
                &[FieldValue::Vector3(Vec3::new(1.5, 0.0, -2.0)), FieldValue::Int(hp)],
            )
            .unwrap()
        };
        let (baseline, current) = (data(90), data(80));
        let spawned = GhostId::new(EntityId::new(1), Tick::new(3));
        let moved = GhostId::new(EntityId::new(2), Tick::new(1));
        let gone = GhostId::new(EntityId::new(9), Tick::new(2));
        let mut out = vec![0u8; 256];
        let len = encode_snapshot_packet(
            registry,
            Tick::new(10),
            &[gone],
            &CodecLimits::default(),
            &mut out,
            |section| {
                section.write_slice(spawned, &current, None, None)?;
                section.write_slice(moved, &current, Some((Tick::new(8), &baseline)), None)?;
                Ok(())
            },
        )
        .unwrap();
        out.truncate(len);
        out
    }

    #[test]
    fn snapshot_report_with_schema() {
        let registry = registry();
        let bytes = snapshot_packet(&registry);
        let report = inspect_packet(
            &bytes,
            Some(&registry),
            &wire::Limits::default(),
            &CodecLimits::default(),
        )
        .unwrap();

        assert_eq!(report.kind, PacketKind::Snapshot);
        assert_eq!(report.tick, 10);
        assert_eq!(report.schema_matches, Some(true));
        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.despawns, vec![GhostReport { entity: 9, spawn_tick: Some(2) }]);
        assert_eq!(report.slices.len(), 2);

        let full = &report.slices[0];
        assert!(full.full);
        assert_eq!(full.ghost_type, Some(7));
        assert_eq!(full.spawn_tick, Some(3));
        let fields = full.fields.as_ref().unwrap();
        assert_eq!(fields[0].value, json!([1.5, 0.0, -2.0]));
        assert_eq!(fields[1].value, json!(80));

        let delta = &report.slices[1];
        assert!(!delta.full);
        assert_eq!(delta.baseline_tick, Some(8));
        assert_eq!(delta.predict_tick, None);
        assert!(delta.fields.is_none());

        let text = format_report(&report);
        assert!(text.contains("entity 2: delta vs 8"));
        assert!(text.contains("hp: 80"));
    }

    #[test]
    fn headers_decode_without_schema() {
        let bytes = snapshot_packet(&registry());
        let report =
            inspect_packet(&bytes, None, &wire::Limits::default(), &CodecLimits::default())
                .unwrap();
        assert_eq!(report.schema_matches, None);
        assert_eq!(report.slices.len(), 2);
        assert!(report.slices.iter().all(|s| s.fields.is_none()));
    }

    #[test]
    fn ack_report() {
        let registry = registry();
        let mut ack = AckState::new();
        ack.record(Tick::new(4));
        ack.record(Tick::new(6));
        let mut out = vec![0u8; 128];
        let len = encode_ack_packet(
            &registry,
            &ack,
            &[EntityId::new(5)],
            &CodecLimits::default(),
            &mut out,
        )
        .unwrap();
        let report = inspect_packet(
            &out[..len],
            Some(&registry),
            &wire::Limits::default(),
            &CodecLimits::default(),
        )
        .unwrap();
        assert_eq!(report.kind, PacketKind::Ack);
        let ack_report = report.ack.unwrap();
        assert_eq!(ack_report.last_received, Some(6));
        assert_eq!(ack_report.mask, ack.mask());
        assert_eq!(ack_report.resync, vec![5]);
    }

    #[test]
    fn truncated_packet_is_an_error() {
        let bytes = snapshot_packet(&registry());
        let result = inspect_packet(
            &bytes[..bytes.len() - 1],
            None,
            &wire::Limits::default(),
            &CodecLimits::default(),
        );
        assert!(result.is_err());
    }
}
