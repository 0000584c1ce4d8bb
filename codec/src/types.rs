//! Core identifier types for the codec.

use std::fmt;

use crate::Tick;

/// A stable entity identifier.
///
/// Entity IDs are assigned by the simulation layer and may be reused after a
/// despawn; pair them with a spawn tick via [`GhostId`] to tell incarnations apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw entity ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<EntityId> for u32 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A replicated entity instance: an id plus the tick it was spawned on.
///
/// Two ghosts are equal only if both parts match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GhostId {
    pub entity: EntityId,
    pub spawn_tick: Tick,
}

impl GhostId {
    #[must_use]
    pub const fn new(entity: EntityId, spawn_tick: Tick) -> Self {
        Self { entity, spawn_tick }
    }
}

impl fmt::Display for GhostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity, self.spawn_tick)
    }
}
