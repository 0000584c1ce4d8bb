//! Ghost type definitions and schema validation.

use std::collections::HashSet;
use std::fmt;

use crate::error::{SchemaError, SchemaResult};
use crate::layout::{GhostLayout, MAX_CHANGE_BITS};
use crate::FieldDef;

/// Identifier of a replicated ghost type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct GhostTypeId(u16);

impl GhostTypeId {
    /// Creates a ghost type id.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for GhostTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage shape of a ghost type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GhostTypeKind {
    /// A single component value per ghost.
    #[default]
    Component,
    /// A buffer element type; replicates all fields or none.
    Buffer,
}

/// A replicated type: an ordered list of fields.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GhostTypeDef {
    pub id: GhostTypeId,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub kind: GhostTypeKind,
    /// Base importance used to rank ghosts when a snapshot is over budget.
    #[cfg_attr(feature = "serde", serde(default = "default_importance"))]
    pub importance: u32,
    pub fields: Vec<FieldDef>,
}

#[cfg(feature = "serde")]
const fn default_importance() -> u32 {
    1
}

impl GhostTypeDef {
    /// Creates a component-kind type with no fields and importance 1.
    #[must_use]
    pub fn new(id: GhostTypeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: GhostTypeKind::Component,
            importance: 1,
            fields: Vec::new(),
        }
    }

    /// Marks the type as a buffer element type.
    #[must_use]
    pub fn buffer(mut self) -> Self {
        self.kind = GhostTypeKind::Buffer;
        self
    }

    /// Sets the base importance.
    #[must_use]
    pub fn importance(mut self, importance: u32) -> Self {
        self.importance = importance;
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Iterates over replicated fields with their declaration index.
    pub fn replicated_fields(&self) -> impl Iterator<Item = (usize, &FieldDef)> {
        self.fields.iter().enumerate().filter(|(_, f)| f.replicated)
    }
}

/// A validated set of ghost types.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Schema {
    pub ghost_types: Vec<GhostTypeDef>,
}

impl Schema {
    /// Creates a schema from ghost types after validation.
    pub fn new(ghost_types: Vec<GhostTypeDef>) -> SchemaResult<Self> {
        let schema = Self { ghost_types };
        schema.validate()?;
        Ok(schema)
    }

    /// Creates a schema builder.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder {
            ghost_types: Vec::new(),
        }
    }

    /// Looks up a ghost type by id.
    #[must_use]
    pub fn ghost_type(&self, id: GhostTypeId) -> Option<&GhostTypeDef> {
        self.ghost_types.iter().find(|t| t.id == id)
    }

    /// Validates schema invariants.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut ids = HashSet::new();
        for ghost_type in &self.ghost_types {
            if !ids.insert(ghost_type.id) {
                return Err(SchemaError::DuplicateGhostTypeId { id: ghost_type.id });
            }
            validate_ghost_type(ghost_type)?;
        }
        Ok(())
    }
}

/// Builder for `Schema`.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    ghost_types: Vec<GhostTypeDef>,
}

impl SchemaBuilder {
    /// Adds a ghost type definition.
    #[must_use]
    pub fn ghost_type(mut self, ghost_type: GhostTypeDef) -> Self {
        self.ghost_types.push(ghost_type);
        self
    }

    /// Builds the schema after validation.
    pub fn build(self) -> SchemaResult<Schema> {
        Schema::new(self.ghost_types)
    }
}

fn validate_ghost_type(ghost_type: &GhostTypeDef) -> SchemaResult<()> {
    let id = ghost_type.id;
    let mut names = HashSet::new();
    for field in &ghost_type.fields {
        if !names.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateFieldName {
                ghost_type: id,
                field: field.name.clone(),
            });
        }
        validate_field(id, field)?;
    }

    if ghost_type.kind == GhostTypeKind::Buffer {
        let replicated = ghost_type.replicated_fields().count();
        let total = ghost_type.fields.len();
        if replicated != 0 && replicated != total {
            return Err(SchemaError::PartialBufferReplication {
                ghost_type: id,
                replicated,
                total,
            });
        }
    }

    let bits = GhostLayout::new(ghost_type).change_bits();
    if bits > MAX_CHANGE_BITS {
        return Err(SchemaError::TooManyChangeBits {
            ghost_type: id,
            bits,
            max: MAX_CHANGE_BITS,
        });
    }
    Ok(())
}

fn validate_field(ghost_type: GhostTypeId, field: &FieldDef) -> SchemaResult<()> {
    if let Some(factor) = field.quantization.factor() {
        if !field.kind.is_floating() {
            return Err(SchemaError::QuantizationNotSupported {
                ghost_type,
                field: field.name.clone(),
                kind: field.kind.name(),
            });
        }
        if factor == 0 {
            return Err(SchemaError::InvalidQuantization {
                ghost_type,
                field: field.name.clone(),
            });
        }
    }
    if field.composite && !field.kind.supports_composite() {
        return Err(SchemaError::CompositeNotSupported {
            ghost_type,
            field: field.name.clone(),
            kind: field.kind.name(),
        });
    }
    if let Some(distance) = field.max_smoothing_distance {
        if !distance.is_finite() || distance <= 0.0 {
            return Err(SchemaError::InvalidSmoothingDistance {
                ghost_type,
                field: field.name.clone(),
            });
        }
    }
    Ok(())
}
