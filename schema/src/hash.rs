//! Deterministic schema hashing.

use blake3::Hasher;

use crate::{FieldDef, FieldKind, GhostTypeKind, Quantization, Schema, Smoothing, StringCapacity};

/// Computes a deterministic hash for schema validation.
///
/// Every property that changes the wire encoding or the client's restore
/// behavior contributes. Names are included so a renamed field is caught.
#[must_use]
pub fn schema_hash(schema: &Schema) -> u64 {
    let mut hasher = Hasher::new();
    write_u32(&mut hasher, schema.ghost_types.len() as u32);

    for ghost_type in &schema.ghost_types {
        write_u16(&mut hasher, ghost_type.id.get());
        write_str(&mut hasher, &ghost_type.name);
        write_u8(
            &mut hasher,
            match ghost_type.kind {
                GhostTypeKind::Component => 0,
                GhostTypeKind::Buffer => 1,
            },
        );
        write_u32(&mut hasher, ghost_type.fields.len() as u32);

        for field in &ghost_type.fields {
            write_field(&mut hasher, field);
        }
    }

    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

fn write_field(hasher: &mut Hasher, field: &FieldDef) {
    write_str(hasher, &field.name);
    write_kind(hasher, field.kind);
    match field.quantization {
        Quantization::None => write_u8(hasher, 0),
        Quantization::Factor(factor) => {
            write_u8(hasher, 1);
            write_u32(hasher, factor);
        }
    }
    write_u8(
        hasher,
        match field.smoothing {
            Smoothing::Clamp => 0,
            Smoothing::Interpolate => 1,
            Smoothing::InterpolateAndExtrapolate => 2,
        },
    );
    write_u8(hasher, u8::from(field.composite));
    write_u8(hasher, u8::from(field.replicated));
    match field.max_smoothing_distance {
        None => write_u8(hasher, 0),
        Some(distance) => {
            write_u8(hasher, 1);
            write_u32(hasher, distance.to_bits());
        }
    }
}

fn write_kind(hasher: &mut Hasher, kind: FieldKind) {
    let tag = match kind {
        FieldKind::Bool => 0,
        FieldKind::Int => 1,
        FieldKind::UInt => 2,
        FieldKind::Long => 3,
        FieldKind::ULong => 4,
        FieldKind::Float => 5,
        FieldKind::Double => 6,
        FieldKind::Vector2 => 7,
        FieldKind::Vector3 => 8,
        FieldKind::Quaternion => 9,
        FieldKind::FixedString(_) => 10,
        FieldKind::Entity => 11,
    };
    write_u8(hasher, tag);
    if let FieldKind::FixedString(capacity) = kind {
        write_u16(hasher, string_capacity_code(capacity));
    }
}

fn string_capacity_code(capacity: StringCapacity) -> u16 {
    capacity.bytes() as u16
}

fn write_str(hasher: &mut Hasher, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

fn write_u8(hasher: &mut Hasher, value: u8) {
    hasher.update(&[value]);
}

fn write_u16(hasher: &mut Hasher, value: u16) {
    hasher.update(&value.to_le_bytes());
}

fn write_u32(hasher: &mut Hasher, value: u32) {
    hasher.update(&value.to_le_bytes());
}
