//! Capability-dispatch table: one set of routines per field kind.
//!
//! Every [`FieldDescriptor`] points at a static [`FieldOps`] entry chosen once
//! when the registry is built. Snapshot words hold the quantized form of a
//! field; the routines move values between live form, words and the wire.
//!
//! Word layouts:
//! - bool, int, uint: one word
//! - long, ulong, double: low word then high word
//! - float components: IEEE bits, or the quantized `i32` when a factor is set
//! - fixed string: byte length, then bytes packed little-endian four per word
//! - entity: present flag, entity id, spawn tick

use bitstream::{
    dequantize_f32, dequantize_f64, quantize_f32, quantize_f64, BitReader, BitResult, BitWriter,
    CompressionModel,
};
use glam::{Quat, Vec2, Vec3};
use schema::{FieldKind, Quantization};

use crate::change_mask::ChangeMask;
use crate::error::{CodecError, CodecResult};
use crate::registry::FieldDescriptor;
use crate::{EntityId, FieldValue, GhostId, Tick};

/// Routines for one field kind.
pub struct FieldOps {
    /// Converts a live value into snapshot words.
    pub store: fn(&FieldDescriptor, &FieldValue, &mut [u32]) -> CodecResult<()>,
    /// Converts snapshot words back into a live value.
    pub load: fn(&FieldDescriptor, &[u32]) -> FieldValue,
    /// Writes a changed field against its reference words.
    pub write: fn(&FieldDescriptor, &FieldWrite<'_>, &mut BitWriter<'_>) -> BitResult<()>,
    /// Reads a changed field into `out`, which starts as a copy of the baseline.
    pub read: fn(&FieldDescriptor, &FieldRead<'_>, &mut BitReader<'_>, &mut [u32]) -> BitResult<()>,
    /// Blends two live values; `None` for kinds that only clamp.
    pub blend: Option<fn(&FieldValue, &FieldValue, f32) -> FieldValue>,
    /// Words may be predicted from two baselines before delta packing.
    pub predictable: bool,
    /// Most bits `write` can produce for the field.
    pub max_bits: fn(&FieldDescriptor, &CompressionModel) -> usize,
}

impl std::fmt::Debug for FieldOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldOps")
            .field("blend", &self.blend.is_some())
            .field("predictable", &self.predictable)
            .finish_non_exhaustive()
    }
}

/// Inputs for writing one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldWrite<'a> {
    pub current: &'a [u32],
    pub baseline: &'a [u32],
    /// Predicted words for predictable kinds, the baseline otherwise.
    pub reference: &'a [u32],
    pub mask: &'a ChangeMask,
    pub model: &'a CompressionModel,
}

/// Inputs for reading one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldRead<'a> {
    pub baseline: &'a [u32],
    pub reference: &'a [u32],
    pub mask: &'a ChangeMask,
    pub model: &'a CompressionModel,
}

/// Selects the routines for a field kind and quantization.
#[must_use]
pub fn ops_for(kind: FieldKind, quantization: Quantization) -> &'static FieldOps {
    let quantized = quantization.factor().is_some();
    match kind {
        FieldKind::Bool => &BOOL,
        FieldKind::Int => &INT,
        FieldKind::UInt => &UINT,
        FieldKind::Long => &LONG,
        FieldKind::ULong => &ULONG,
        FieldKind::Double if quantized => &DOUBLE_QUANTIZED,
        FieldKind::Double => &DOUBLE_RAW,
        FieldKind::Float | FieldKind::Vector2 | FieldKind::Vector3 | FieldKind::Quaternion => {
            if quantized {
                &FLOATS_QUANTIZED
            } else {
                &FLOATS_RAW
            }
        }
        FieldKind::FixedString(_) => &FIXED_STRING,
        FieldKind::Entity => &ENTITY,
    }
}

static BOOL: FieldOps = FieldOps {
    store: store_bool,
    load: |_, words| FieldValue::Bool(words[0] != 0),
    write: |_, args, w| w.write_bit(args.current[0] != 0),
    read: |_, _, r, out| {
        out[0] = u32::from(r.read_bit()?);
        Ok(())
    },
    blend: None,
    predictable: false,
    max_bits: |_, _| 1,
};

static INT: FieldOps = FieldOps {
    store: store_int,
    load: |_, words| FieldValue::Int(words[0] as i32),
    write: write_word_delta,
    read: read_word_delta,
    blend: Some(blend_integer),
    predictable: true,
    max_bits: |_, model| model.max_packed_bits(),
};

static UINT: FieldOps = FieldOps {
    store: store_uint,
    load: |_, words| FieldValue::UInt(words[0]),
    write: write_word_delta,
    read: read_word_delta,
    blend: Some(blend_integer),
    predictable: true,
    max_bits: |_, model| model.max_packed_bits(),
};

static LONG: FieldOps = FieldOps {
    store: store_long,
    load: |_, words| FieldValue::Long(join(words) as i64),
    write: write_long_delta,
    read: read_long_delta,
    blend: Some(blend_integer),
    predictable: false,
    max_bits: |_, model| 2 * model.max_packed_bits(),
};

static ULONG: FieldOps = FieldOps {
    store: store_long,
    load: |_, words| FieldValue::ULong(join(words)),
    write: write_long_delta,
    read: read_long_delta,
    blend: Some(blend_integer),
    predictable: false,
    max_bits: |_, model| 2 * model.max_packed_bits(),
};

static DOUBLE_RAW: FieldOps = FieldOps {
    store: store_double,
    load: load_double,
    write: |_, args, w| w.write_bits(join(args.current), 64),
    read: |_, _, r, out| {
        split(r.read_bits(64)?, out);
        Ok(())
    },
    blend: Some(blend_floating),
    predictable: false,
    max_bits: |_, _| 64,
};

static DOUBLE_QUANTIZED: FieldOps = FieldOps {
    store: store_double,
    load: load_double,
    write: write_long_delta,
    read: read_long_delta,
    blend: Some(blend_floating),
    predictable: false,
    max_bits: |_, model| 2 * model.max_packed_bits(),
};

static FLOATS_RAW: FieldOps = FieldOps {
    store: store_floats,
    load: load_floats,
    write: write_float_components,
    read: read_float_components,
    blend: Some(blend_floating),
    predictable: false,
    max_bits: max_float_component_bits,
};

static FLOATS_QUANTIZED: FieldOps = FieldOps {
    store: store_floats,
    load: load_floats,
    write: write_float_components,
    read: read_float_components,
    blend: Some(blend_floating),
    predictable: true,
    max_bits: max_float_component_bits,
};

static FIXED_STRING: FieldOps = FieldOps {
    store: store_string,
    load: |_, words| FieldValue::String(String::from_utf8_lossy(&string_bytes(words)).into_owned()),
    write: |field, args, w| {
        let capacity = string_capacity(field);
        w.write_fixed_string_delta(
            &string_bytes(args.current),
            &string_bytes(args.baseline),
            capacity,
            args.model,
        )
    },
    read: |field, args, r, out| {
        let capacity = string_capacity(field);
        let bytes = r.read_fixed_string_delta(&string_bytes(args.baseline), capacity, args.model)?;
        pack_string(&bytes, out);
        Ok(())
    },
    blend: None,
    predictable: false,
    max_bits: |field, model| 1 + model.max_packed_bits() + 8 * string_capacity(field),
};

static ENTITY: FieldOps = FieldOps {
    store: store_entity,
    load: |_, words| {
        FieldValue::Entity(
            (words[0] != 0).then(|| GhostId::new(EntityId::new(words[1]), Tick::new(words[2]))),
        )
    },
    write: |_, args, w| {
        w.atomic(|w| {
            let present = args.current[0] != 0;
            w.write_bit(present)?;
            if present {
                w.write_raw_bits(args.current[1], 32)?;
                w.write_raw_bits(args.current[2], 32)?;
            }
            Ok(())
        })
    },
    read: |_, _, r, out| {
        if r.read_bit()? {
            out[0] = 1;
            out[1] = r.read_raw_bits(32)?;
            out[2] = r.read_raw_bits(32)?;
        } else {
            out.fill(0);
        }
        Ok(())
    },
    blend: None,
    predictable: false,
    max_bits: |_, _| 65,
};

fn mismatch(field: &FieldDescriptor, value: &FieldValue) -> CodecError {
    CodecError::TypeMismatch {
        ghost_type: field.ghost_type,
        field: field.name.clone(),
        expected: field.kind.name(),
        found: value.kind_name(),
    }
}

fn store_bool(field: &FieldDescriptor, value: &FieldValue, out: &mut [u32]) -> CodecResult<()> {
    match value {
        FieldValue::Bool(v) => out[0] = u32::from(*v),
        other => return Err(mismatch(field, other)),
    }
    Ok(())
}

fn store_int(field: &FieldDescriptor, value: &FieldValue, out: &mut [u32]) -> CodecResult<()> {
    match value {
        FieldValue::Int(v) => out[0] = *v as u32,
        other => return Err(mismatch(field, other)),
    }
    Ok(())
}

fn store_uint(field: &FieldDescriptor, value: &FieldValue, out: &mut [u32]) -> CodecResult<()> {
    match value {
        FieldValue::UInt(v) => out[0] = *v,
        other => return Err(mismatch(field, other)),
    }
    Ok(())
}

fn store_long(field: &FieldDescriptor, value: &FieldValue, out: &mut [u32]) -> CodecResult<()> {
    match (field.kind, value) {
        (FieldKind::Long, FieldValue::Long(v)) => split(*v as u64, out),
        (FieldKind::ULong, FieldValue::ULong(v)) => split(*v, out),
        (_, other) => return Err(mismatch(field, other)),
    }
    Ok(())
}

fn store_double(field: &FieldDescriptor, value: &FieldValue, out: &mut [u32]) -> CodecResult<()> {
    let FieldValue::Double(v) = value else {
        return Err(mismatch(field, value));
    };
    let bits = match field.scale {
        Some(scale) => quantize_f64(*v, scale) as u64,
        None => v.to_bits(),
    };
    split(bits, out);
    Ok(())
}

fn load_double(field: &FieldDescriptor, words: &[u32]) -> FieldValue {
    let bits = join(words);
    FieldValue::Double(match field.scale {
        Some(scale) => dequantize_f64(bits as i64, scale),
        None => f64::from_bits(bits),
    })
}

fn encode_f32(field: &FieldDescriptor, value: f32) -> u32 {
    match field.scale {
        Some(scale) => quantize_f32(value, scale) as u32,
        None => value.to_bits(),
    }
}

fn decode_f32(field: &FieldDescriptor, word: u32) -> f32 {
    match field.scale {
        Some(scale) => dequantize_f32(word as i32, scale),
        None => f32::from_bits(word),
    }
}

fn store_floats(field: &FieldDescriptor, value: &FieldValue, out: &mut [u32]) -> CodecResult<()> {
    let components: [f32; 4] = match (field.kind, value) {
        (FieldKind::Float, FieldValue::Float(v)) => [*v, 0.0, 0.0, 0.0],
        (FieldKind::Vector2, FieldValue::Vector2(v)) => [v.x, v.y, 0.0, 0.0],
        (FieldKind::Vector3, FieldValue::Vector3(v)) => [v.x, v.y, v.z, 0.0],
        (FieldKind::Quaternion, FieldValue::Quaternion(q)) => [q.x, q.y, q.z, q.w],
        (_, other) => return Err(mismatch(field, other)),
    };
    for (word, component) in out.iter_mut().zip(components) {
        *word = encode_f32(field, component);
    }
    Ok(())
}

fn load_floats(field: &FieldDescriptor, words: &[u32]) -> FieldValue {
    let c = |i: usize| decode_f32(field, words[i]);
    match field.kind {
        FieldKind::Vector2 => FieldValue::Vector2(Vec2::new(c(0), c(1))),
        FieldKind::Vector3 => FieldValue::Vector3(Vec3::new(c(0), c(1), c(2))),
        FieldKind::Quaternion => FieldValue::Quaternion(Quat::from_xyzw(c(0), c(1), c(2), c(3))),
        _ => FieldValue::Float(c(0)),
    }
}

fn write_word_delta(
    _: &FieldDescriptor,
    args: &FieldWrite<'_>,
    w: &mut BitWriter<'_>,
) -> BitResult<()> {
    w.write_packed_uint_delta(args.current[0], args.reference[0], args.model)
}

fn read_word_delta(
    _: &FieldDescriptor,
    args: &FieldRead<'_>,
    r: &mut BitReader<'_>,
    out: &mut [u32],
) -> BitResult<()> {
    out[0] = r.read_packed_uint_delta(args.reference[0], args.model)?;
    Ok(())
}

fn write_long_delta(
    _: &FieldDescriptor,
    args: &FieldWrite<'_>,
    w: &mut BitWriter<'_>,
) -> BitResult<()> {
    w.write_packed_long_delta(
        join(args.current) as i64,
        join(args.baseline) as i64,
        args.model,
    )
}

fn read_long_delta(
    _: &FieldDescriptor,
    args: &FieldRead<'_>,
    r: &mut BitReader<'_>,
    out: &mut [u32],
) -> BitResult<()> {
    let value = r.read_packed_long_delta(join(args.baseline) as i64, args.model)?;
    split(value as u64, out);
    Ok(())
}

/// Float, vector and quaternion components.
///
/// With one change bit per component only flagged components are written.
/// Under a shared bit every component is written: quantized ones as packed
/// deltas, raw ones with an unchanged flag so untouched components stay cheap.
fn write_float_components(
    field: &FieldDescriptor,
    args: &FieldWrite<'_>,
    w: &mut BitWriter<'_>,
) -> BitResult<()> {
    let count = field.kind.component_count();
    let shared = field.slot.change_bit_count == 1;
    w.atomic(|w| {
        for c in 0..count {
            if !shared && !args.mask.get(field.slot.change_bit + c) {
                continue;
            }
            if field.scale.is_some() {
                w.write_packed_uint_delta(args.current[c], args.reference[c], args.model)?;
            } else if shared && count > 1 {
                w.write_raw_float_delta(
                    f32::from_bits(args.current[c]),
                    f32::from_bits(args.baseline[c]),
                )?;
            } else {
                w.write_raw_bits(args.current[c], 32)?;
            }
        }
        Ok(())
    })
}

fn read_float_components(
    field: &FieldDescriptor,
    args: &FieldRead<'_>,
    r: &mut BitReader<'_>,
    out: &mut [u32],
) -> BitResult<()> {
    let count = field.kind.component_count();
    let shared = field.slot.change_bit_count == 1;
    for c in 0..count {
        if !shared && !args.mask.get(field.slot.change_bit + c) {
            continue;
        }
        out[c] = if field.scale.is_some() {
            r.read_packed_uint_delta(args.reference[c], args.model)?
        } else if shared && count > 1 {
            r.read_raw_float_delta(f32::from_bits(args.baseline[c]))?.to_bits()
        } else {
            r.read_raw_bits(32)?
        };
    }
    Ok(())
}

fn max_float_component_bits(field: &FieldDescriptor, model: &CompressionModel) -> usize {
    let count = field.kind.component_count();
    let per_component = if field.scale.is_some() {
        model.max_packed_bits()
    } else if field.slot.change_bit_count == 1 && count > 1 {
        33
    } else {
        32
    };
    count * per_component
}

fn string_capacity(field: &FieldDescriptor) -> usize {
    match field.kind {
        FieldKind::FixedString(capacity) => capacity.max_len(),
        _ => 0,
    }
}

fn store_string(field: &FieldDescriptor, value: &FieldValue, out: &mut [u32]) -> CodecResult<()> {
    let FieldValue::String(text) = value else {
        return Err(mismatch(field, value));
    };
    let max = string_capacity(field);
    if text.len() > max {
        return Err(CodecError::StringTooLong {
            ghost_type: field.ghost_type,
            field: field.name.clone(),
            len: text.len(),
            max,
        });
    }
    pack_string(text.as_bytes(), out);
    Ok(())
}

fn pack_string(bytes: &[u8], out: &mut [u32]) {
    out.fill(0);
    let (len_word, body) = out.split_at_mut(1);
    let usable = bytes.len().min(body.len() * 4);
    len_word[0] = usable as u32;
    for (i, &byte) in bytes[..usable].iter().enumerate() {
        body[i / 4] |= u32::from(byte) << ((i % 4) * 8);
    }
}

fn string_bytes(words: &[u32]) -> Vec<u8> {
    let Some((&len, body)) = words.split_first() else {
        return Vec::new();
    };
    let len = (len as usize).min(body.len() * 4);
    (0..len)
        .map(|i| (body[i / 4] >> ((i % 4) * 8)) as u8)
        .collect()
}

fn store_entity(field: &FieldDescriptor, value: &FieldValue, out: &mut [u32]) -> CodecResult<()> {
    match value {
        FieldValue::Entity(Some(ghost)) => {
            out[0] = 1;
            out[1] = ghost.entity.raw();
            out[2] = ghost.spawn_tick.require("entity reference")?;
        }
        FieldValue::Entity(None) => out.fill(0),
        other => return Err(mismatch(field, other)),
    }
    Ok(())
}

fn split(value: u64, out: &mut [u32]) {
    out[0] = value as u32;
    out[1] = (value >> 32) as u32;
}

fn join(words: &[u32]) -> u64 {
    u64::from(words[0]) | (u64::from(words[1]) << 32)
}

fn blend_integer(a: &FieldValue, b: &FieldValue, t: f32) -> FieldValue {
    let t = f64::from(t);
    let lerp = |a: f64, b: f64| (a + (b - a) * t).round();
    match (a, b) {
        (FieldValue::Int(a), FieldValue::Int(b)) => {
            FieldValue::Int(lerp(f64::from(*a), f64::from(*b)) as i32)
        }
        (FieldValue::UInt(a), FieldValue::UInt(b)) => {
            FieldValue::UInt(lerp(f64::from(*a), f64::from(*b)) as u32)
        }
        (FieldValue::Long(a), FieldValue::Long(b)) => {
            FieldValue::Long(lerp(*a as f64, *b as f64) as i64)
        }
        (FieldValue::ULong(a), FieldValue::ULong(b)) => {
            FieldValue::ULong(lerp(*a as f64, *b as f64) as u64)
        }
        _ => a.clone(),
    }
}

fn blend_floating(a: &FieldValue, b: &FieldValue, t: f32) -> FieldValue {
    match (a, b) {
        (FieldValue::Float(a), FieldValue::Float(b)) => FieldValue::Float(a + (b - a) * t),
        (FieldValue::Double(a), FieldValue::Double(b)) => {
            FieldValue::Double(a + (b - a) * f64::from(t))
        }
        (FieldValue::Vector2(a), FieldValue::Vector2(b)) => FieldValue::Vector2(a.lerp(*b, t)),
        (FieldValue::Vector3(a), FieldValue::Vector3(b)) => FieldValue::Vector3(a.lerp(*b, t)),
        (FieldValue::Quaternion(a), FieldValue::Quaternion(b)) => {
            FieldValue::Quaternion(a.normalize().slerp(b.normalize(), t))
        }
        _ => a.clone(),
    }
}
