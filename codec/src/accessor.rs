//! Interfaces to the surrounding simulation.

use std::collections::{HashMap, HashSet};

use crate::registry::FieldDescriptor;
use crate::{EntityId, FieldValue, GhostId, Tick};

/// Reads and writes live component values.
///
/// The accessor is the only mutator of live state; the codec holds values
/// only for the duration of a single capture or restore call.
pub trait ComponentAccessor {
    /// Returns the current value of `field` on `entity`, or `None` if the
    /// entity does not exist.
    fn get_value(&self, entity: EntityId, field: &FieldDescriptor) -> Option<FieldValue>;

    /// Writes a value produced by the codec.
    fn set_value(&mut self, entity: EntityId, field: &FieldDescriptor, value: FieldValue);
}

/// Source of the authoritative server tick.
pub trait TickClock {
    fn current_server_tick(&self) -> Tick;
}

impl TickClock for Tick {
    fn current_server_tick(&self) -> Tick {
        *self
    }
}

/// Resolves ghost references to live entities.
pub trait GhostLookup {
    /// Returns `true` if `ghost` currently exists on this side.
    fn contains(&self, ghost: GhostId) -> bool;
}

impl GhostLookup for HashSet<GhostId> {
    fn contains(&self, ghost: GhostId) -> bool {
        HashSet::contains(self, &ghost)
    }
}

/// Map-backed component storage keyed by entity and field name.
#[derive(Debug, Clone, Default)]
pub struct MemoryComponents {
    values: HashMap<EntityId, HashMap<String, FieldValue>>,
}

impl MemoryComponents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity whose fields all read as zero until set.
    pub fn insert_entity(&mut self, entity: EntityId) {
        self.values.entry(entity).or_default();
    }

    /// Sets a value directly.
    pub fn set(&mut self, entity: EntityId, field: &str, value: FieldValue) {
        self.values
            .entry(entity)
            .or_default()
            .insert(field.to_owned(), value);
    }

    #[must_use]
    pub fn get(&self, entity: EntityId, field: &str) -> Option<&FieldValue> {
        self.values.get(&entity)?.get(field)
    }

    /// Removes every value of `entity`.
    pub fn remove(&mut self, entity: EntityId) {
        self.values.remove(&entity);
    }

    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.values.contains_key(&entity)
    }
}

impl ComponentAccessor for MemoryComponents {
    fn get_value(&self, entity: EntityId, field: &FieldDescriptor) -> Option<FieldValue> {
        let fields = self.values.get(&entity)?;
        Some(
            fields
                .get(&field.name)
                .cloned()
                .unwrap_or_else(|| FieldValue::zero(field.kind)),
        )
    }

    fn set_value(&mut self, entity: EntityId, field: &FieldDescriptor, value: FieldValue) {
        self.set(entity, &field.name, value);
    }
}
