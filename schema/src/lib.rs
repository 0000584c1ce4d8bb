//! Replication schema definitions for ghostsync.
//!
//! This crate defines how game state is described for replication:
//! - Ghost types as ordered lists of typed fields
//! - Quantization, smoothing and change-mask grouping per field
//! - Snapshot word layout and change-bit assignment
//! - Deterministic schema hashing
//!
//! # Design Principles
//!
//! - **Runtime-first** - Schemas are built at runtime or loaded from JSON, no code generation.
//! - **Explicit schemas** - No reflection on arbitrary Rust types.
//! - **Validated up front** - A `Schema` that exists has passed every structural check.
//! - **Deterministic hashing** - Schema hash is stable given the same definition.

mod error;
mod field;
mod hash;
mod layout;
mod schema;

pub use error::{SchemaError, SchemaResult};
pub use field::{FieldDef, FieldKind, Quantization, Smoothing, StringCapacity};
pub use hash::schema_hash;
pub use layout::{FieldSlot, GhostLayout, MAX_CHANGE_BITS};
pub use schema::{GhostTypeDef, GhostTypeId, GhostTypeKind, Schema, SchemaBuilder};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        let def = GhostTypeDef::new(GhostTypeId::new(7), "crate")
            .importance(5)
            .field(FieldDef::new("open", FieldKind::Bool));
        let schema = Schema::new(vec![def]).unwrap();
        let _ = schema_hash(&schema);
        let _ = GhostLayout::new(&schema.ghost_types[0]);
        assert_eq!(schema.ghost_types[0].importance, 5);
    }

    #[test]
    fn ghost_type_id_display() {
        assert_eq!(GhostTypeId::new(42).to_string(), "42");
        assert_eq!(GhostTypeId::new(42).get(), 42);
    }
}
