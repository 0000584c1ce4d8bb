//! Runtime registry of ghost type codecs, built once from a schema.

use std::collections::BTreeMap;

use bitstream::CompressionModel;
use schema::{
    schema_hash, FieldKind, FieldSlot, GhostLayout, GhostTypeId, GhostTypeKind, Schema,
    SchemaError, Smoothing,
};

use crate::error::{CodecError, CodecResult};
use crate::field_ops::{ops_for, FieldOps};
use crate::packet::MAX_SLICE_BITS;

/// Immutable per-field metadata plus its dispatch entry.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub ghost_type: GhostTypeId,
    /// Index in the ghost type's declaration list.
    pub index: usize,
    pub name: String,
    pub kind: FieldKind,
    pub slot: FieldSlot,
    /// Quantization factor, if any.
    pub scale: Option<u32>,
    pub smoothing: Smoothing,
    pub max_smoothing_distance: Option<f32>,
    ops: &'static FieldOps,
}

impl FieldDescriptor {
    /// The dispatch entry for this field's kind.
    #[must_use]
    pub fn ops(&self) -> &'static FieldOps {
        self.ops
    }

    /// Word range of this field inside a snapshot buffer.
    #[must_use]
    pub fn words(&self) -> std::ops::Range<usize> {
        self.slot.word_offset..self.slot.word_offset + self.slot.word_count
    }
}

/// Codec for one ghost type: its layout and replicated field descriptors.
#[derive(Debug, Clone)]
pub struct GhostTypeCodec {
    pub id: GhostTypeId,
    pub name: String,
    pub kind: GhostTypeKind,
    pub importance: u32,
    layout: GhostLayout,
    fields: Vec<FieldDescriptor>,
}

impl GhostTypeCodec {
    /// Replicated fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a replicated field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn layout(&self) -> &GhostLayout {
        &self.layout
    }

    #[must_use]
    pub fn word_count(&self) -> usize {
        self.layout.word_count()
    }

    #[must_use]
    pub fn change_bits(&self) -> usize {
        self.layout.change_bits()
    }

    /// Upper bound on the body of a full slice: the mask plus every field.
    #[must_use]
    pub fn max_body_bits(&self, model: &CompressionModel) -> usize {
        let mask = self.layout.mask_words() * model.max_packed_bits();
        self.fields
            .iter()
            .map(|field| (field.ops.max_bits)(field, model))
            .sum::<usize>()
            + mask
    }
}

/// All ghost type codecs of a schema, plus the shared compression model.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    types: BTreeMap<GhostTypeId, GhostTypeCodec>,
    schema_hash: u64,
    model: CompressionModel,
}

impl CodecRegistry {
    /// Builds a registry with the default compression model.
    pub fn new(schema: &Schema) -> CodecResult<Self> {
        Self::with_model(schema, CompressionModel::default())
    }

    /// Builds a registry with a custom compression model. Both peers must agree on it.
    pub fn with_model(schema: &Schema, model: CompressionModel) -> CodecResult<Self> {
        schema.validate()?;
        let mut types = BTreeMap::new();
        for def in &schema.ghost_types {
            let layout = GhostLayout::new(def);
            let fields = layout
                .slots()
                .iter()
                .map(|slot| {
                    let field = &def.fields[slot.field_index];
                    FieldDescriptor {
                        ghost_type: def.id,
                        index: slot.field_index,
                        name: field.name.clone(),
                        kind: field.kind,
                        slot: *slot,
                        scale: field.quantization.factor(),
                        smoothing: field.smoothing,
                        max_smoothing_distance: field.max_smoothing_distance,
                        ops: ops_for(field.kind, field.quantization),
                    }
                })
                .collect();
            let codec = GhostTypeCodec {
                id: def.id,
                name: def.name.clone(),
                kind: def.kind,
                importance: def.importance,
                layout,
                fields,
            };
            let worst_case_bits = codec.max_body_bits(&model);
            if worst_case_bits > MAX_SLICE_BITS {
                return Err(SchemaError::SliceTooLarge {
                    ghost_type: def.id,
                    worst_case_bits,
                    max: MAX_SLICE_BITS,
                }
                .into());
            }
            types.insert(def.id, codec);
        }
        Ok(Self {
            types,
            schema_hash: schema_hash(schema),
            model,
        })
    }

    /// Returns the codec for a ghost type.
    pub fn ghost_type(&self, id: GhostTypeId) -> CodecResult<&GhostTypeCodec> {
        self.types
            .get(&id)
            .ok_or(CodecError::UnknownGhostType { ghost_type: id })
    }

    /// Iterates over all ghost type codecs in id order.
    pub fn ghost_types(&self) -> impl Iterator<Item = &GhostTypeCodec> {
        self.types.values()
    }

    #[must_use]
    pub const fn schema_hash(&self) -> u64 {
        self.schema_hash
    }

    #[must_use]
    pub const fn model(&self) -> &CompressionModel {
        &self.model
    }
}
