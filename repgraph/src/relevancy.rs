//! Per-connection relevancy sets.

use std::collections::BTreeSet;

use codec::EntityId;

/// How a [`RelevancySet`] reads its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RelevancyMode {
    /// Everything is relevant; listed entities are excluded.
    #[default]
    AllExcept,
    /// Nothing is relevant; listed entities are included.
    OnlyListed,
}

/// Entities a connection treats as exceptions to its relevancy mode.
///
/// Game logic mutates the set between ticks; snapshot builds only read it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelevancySet {
    mode: RelevancyMode,
    listed: BTreeSet<EntityId>,
}

impl RelevancySet {
    #[must_use]
    pub fn new(mode: RelevancyMode) -> Self {
        Self {
            mode,
            listed: BTreeSet::new(),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> RelevancyMode {
        self.mode
    }

    /// Switches mode. The listed entities meant the opposite under the old
    /// mode, so they are cleared.
    pub fn set_mode(&mut self, mode: RelevancyMode) {
        if self.mode != mode {
            self.mode = mode;
            self.listed.clear();
        }
    }

    /// Lists an entity. Returns `false` if it was already listed.
    pub fn insert(&mut self, entity: EntityId) -> bool {
        self.listed.insert(entity)
    }

    /// Unlists an entity. Returns `false` if it was not listed.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        self.listed.remove(&entity)
    }

    pub fn clear(&mut self) {
        self.listed.clear();
    }

    #[must_use]
    pub fn is_listed(&self, entity: EntityId) -> bool {
        self.listed.contains(&entity)
    }

    pub fn listed(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.listed.iter().copied()
    }

    /// Returns `true` if `entity` should be replicated to this connection.
    #[must_use]
    pub fn is_relevant(&self, entity: EntityId) -> bool {
        match self.mode {
            RelevancyMode::AllExcept => !self.listed.contains(&entity),
            RelevancyMode::OnlyListed => self.listed.contains(&entity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_except_excludes_listed() {
        let mut set = RelevancySet::new(RelevancyMode::AllExcept);
        assert!(set.is_relevant(EntityId::new(1)));
        assert!(set.insert(EntityId::new(1)));
        assert!(!set.insert(EntityId::new(1)));
        assert!(!set.is_relevant(EntityId::new(1)));
        assert!(set.is_relevant(EntityId::new(2)));
    }

    #[test]
    fn only_listed_includes_listed() {
        let mut set = RelevancySet::new(RelevancyMode::OnlyListed);
        assert!(!set.is_relevant(EntityId::new(1)));
        set.insert(EntityId::new(1));
        assert!(set.is_relevant(EntityId::new(1)));
        assert!(set.remove(EntityId::new(1)));
        assert!(!set.is_relevant(EntityId::new(1)));
    }

    #[test]
    fn switching_mode_clears_list() {
        let mut set = RelevancySet::new(RelevancyMode::AllExcept);
        set.insert(EntityId::new(4));
        set.set_mode(RelevancyMode::AllExcept);
        assert!(set.is_listed(EntityId::new(4)));
        set.set_mode(RelevancyMode::OnlyListed);
        assert_eq!(set.listed().count(), 0);
        assert!(!set.is_relevant(EntityId::new(4)));
    }
}
