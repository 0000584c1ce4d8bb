//! Snapshot capture, delta serialization and restore.

use bitstream::{BitReader, BitWriter, CompressionModel};
use schema::GhostTypeId;

use crate::accessor::{ComponentAccessor, GhostLookup};
use crate::change_mask::{compute_change_mask, ChangeMask};
use crate::error::{CodecError, CodecResult};
use crate::field_ops::{FieldRead, FieldWrite};
use crate::predictor::DeltaPredictor;
use crate::registry::{CodecRegistry, FieldDescriptor, GhostTypeCodec};
use crate::{EntityId, FieldValue, Tick};

/// Quantized state of one ghost at one tick.
///
/// `changed` records which fields differed from the baseline this snapshot
/// was encoded or decoded against; a captured snapshot has every bit set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotData {
    ghost_type: GhostTypeId,
    words: Box<[u32]>,
    changed: ChangeMask,
}

impl SnapshotData {
    /// A snapshot with every word zero.
    #[must_use]
    pub fn zeroed(codec: &GhostTypeCodec) -> Self {
        Self {
            ghost_type: codec.id,
            words: vec![0; codec.word_count()].into_boxed_slice(),
            changed: ChangeMask::all(codec.change_bits()),
        }
    }

    #[must_use]
    pub const fn ghost_type(&self) -> GhostTypeId {
        self.ghost_type
    }

    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    #[must_use]
    pub const fn changed(&self) -> &ChangeMask {
        &self.changed
    }

    /// Words of one field.
    #[must_use]
    pub fn field_words(&self, field: &FieldDescriptor) -> &[u32] {
        &self.words[field.words()]
    }

    /// Live value of one field.
    #[must_use]
    pub fn value(&self, field: &FieldDescriptor) -> FieldValue {
        (field.ops().load)(field, self.field_words(field))
    }

    /// Live values of every replicated field, in declaration order.
    #[must_use]
    pub fn values(&self, codec: &GhostTypeCodec) -> Vec<FieldValue> {
        codec.fields().iter().map(|f| self.value(f)).collect()
    }
}

/// Reads every replicated field of `entity` and stores its quantized form.
pub fn capture(
    codec: &GhostTypeCodec,
    entity: EntityId,
    accessor: &impl ComponentAccessor,
) -> CodecResult<SnapshotData> {
    let mut snapshot = SnapshotData::zeroed(codec);
    for field in codec.fields() {
        let value = accessor
            .get_value(entity, field)
            .ok_or(CodecError::UnknownEntity { entity })?;
        (field.ops().store)(field, &value, &mut snapshot.words[field.words()])?;
    }
    Ok(snapshot)
}

/// Builds a snapshot from live values given in declaration order.
pub fn snapshot_from_values(
    codec: &GhostTypeCodec,
    values: &[FieldValue],
) -> CodecResult<SnapshotData> {
    let mut snapshot = SnapshotData::zeroed(codec);
    for (field, value) in codec.fields().iter().zip(values) {
        (field.ops().store)(field, value, &mut snapshot.words[field.words()])?;
    }
    Ok(snapshot)
}

/// Writes a snapshot's values back to live components.
///
/// Entity references that `lookup` cannot resolve are written as `None`.
pub fn restore(
    registry: &CodecRegistry,
    entity: EntityId,
    snapshot: &SnapshotData,
    accessor: &mut impl ComponentAccessor,
    lookup: &impl GhostLookup,
) -> CodecResult<()> {
    let codec = registry.ghost_type(snapshot.ghost_type)?;
    for field in codec.fields() {
        let value = resolve_reference(snapshot.value(field), lookup);
        accessor.set_value(entity, field, value);
    }
    Ok(())
}

pub(crate) fn resolve_reference(value: FieldValue, lookup: &impl GhostLookup) -> FieldValue {
    match value {
        FieldValue::Entity(Some(ghost)) if !lookup.contains(ghost) => FieldValue::Entity(None),
        other => other,
    }
}

/// A snapshot used as a delta reference, with the tick it was taken at.
pub type Baseline<'a> = (Tick, &'a SnapshotData);

/// Writes the change mask and every changed field of `current`.
///
/// Without a baseline the ghost is written against zero words with every bit
/// set. With an `older` baseline as well, predictable fields are delta packed
/// against the linear prediction for `target` instead of the baseline value.
/// On error nothing is left in the writer.
pub fn write_ghost_fields(
    codec: &GhostTypeCodec,
    target: Tick,
    current: &SnapshotData,
    baseline: Option<Baseline<'_>>,
    older: Option<Baseline<'_>>,
    model: &CompressionModel,
    writer: &mut BitWriter<'_>,
) -> CodecResult<ChangeMask> {
    let zero;
    let base_words = match baseline {
        Some((_, data)) => data.words(),
        None => {
            zero = vec![0u32; codec.word_count()];
            &zero[..]
        }
    };
    let mask = compute_change_mask(codec, current.words(), baseline.map(|(_, d)| d.words()));
    let reference = reference_words(codec, target, baseline, older);
    let reference = reference.as_deref().unwrap_or(base_words);

    let start = writer.checkpoint();
    let result = write_fields(codec, current.words(), base_words, reference, &mask, model, writer);
    if result.is_err() {
        writer.rewind(start);
    }
    result.map(|()| mask)
}

fn write_fields(
    codec: &GhostTypeCodec,
    current: &[u32],
    baseline: &[u32],
    reference: &[u32],
    mask: &ChangeMask,
    model: &CompressionModel,
    writer: &mut BitWriter<'_>,
) -> CodecResult<()> {
    mask.write(writer, model)?;
    for field in codec.fields() {
        if !mask.any_in(field.slot.change_bit, field.slot.change_bit_count) {
            continue;
        }
        let range = field.words();
        let args = FieldWrite {
            current: &current[range.clone()],
            baseline: &baseline[range.clone()],
            reference: &reference[range],
            mask,
            model,
        };
        (field.ops().write)(field, &args, writer)?;
    }
    Ok(())
}

/// Reads a change mask and the changed fields, copying unchanged ones from the baseline.
///
/// `baseline` and `older` must be the same snapshots the writer used.
pub fn read_ghost_fields(
    codec: &GhostTypeCodec,
    target: Tick,
    baseline: Option<Baseline<'_>>,
    older: Option<Baseline<'_>>,
    model: &CompressionModel,
    reader: &mut BitReader<'_>,
) -> CodecResult<SnapshotData> {
    let mut words = match baseline {
        Some((_, data)) => data.words().to_vec(),
        None => vec![0u32; codec.word_count()],
    };
    let base_words = words.clone();
    let reference = reference_words(codec, target, baseline, older);
    let reference = reference.as_deref().unwrap_or(&base_words);

    let mask = ChangeMask::read(reader, codec.change_bits(), codec.id, model)?;
    for field in codec.fields() {
        if !mask.any_in(field.slot.change_bit, field.slot.change_bit_count) {
            continue;
        }
        let range = field.words();
        let args = FieldRead {
            baseline: &base_words[range.clone()],
            reference: &reference[range.clone()],
            mask: &mask,
            model,
        };
        (field.ops().read)(field, &args, reader, &mut words[range])?;
    }
    Ok(SnapshotData {
        ghost_type: codec.id,
        words: words.into_boxed_slice(),
        changed: mask,
    })
}

/// Predicted words, or `None` when the baseline itself is the reference.
fn reference_words(
    codec: &GhostTypeCodec,
    target: Tick,
    baseline: Option<Baseline<'_>>,
    older: Option<Baseline<'_>>,
) -> Option<Vec<u32>> {
    let ((base_tick, base), (older_tick, older)) = (baseline?, older?);
    let predictor = DeltaPredictor::new(target, base_tick, older_tick);
    let mut reference = base.words().to_vec();
    for field in codec.fields().iter().filter(|f| f.ops().predictable) {
        for i in field.words() {
            reference[i] = predictor.predict_word(base.words[i], older.words[i]);
        }
    }
    Some(reference)
}
