//! Fixed-capacity snapshot history indexed by tick.
//!
//! Entries live in a fixed array of slots addressed by `tick mod capacity`.
//! Readers borrow a [`HistoryView`], which cannot outlive the history it
//! views and blocks mutation while it is alive.

use crate::error::{CodecError, CodecResult};
use crate::Tick;

/// Largest supported history capacity, matching the 64-tick ack window.
pub const MAX_HISTORY_CAPACITY: usize = 64;

/// Default history capacity.
pub const DEFAULT_HISTORY_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
struct Slot<T> {
    tick: Tick,
    value: Option<T>,
}

/// A ring buffer of per-tick entries.
///
/// Storing overwrites whatever the target slot held. Keeping still-needed
/// baselines alive is the caller's job.
#[derive(Debug, Clone)]
pub struct SnapshotHistory<T> {
    slots: Box<[Slot<T>]>,
    last_stored: Tick,
}

impl<T> SnapshotHistory<T> {
    /// Creates an empty history.
    ///
    /// `capacity` must be a power of two no larger than [`MAX_HISTORY_CAPACITY`]
    /// so slot indices stay continuous when ticks wrap.
    pub fn new(capacity: usize) -> CodecResult<Self> {
        if capacity == 0 || !capacity.is_power_of_two() || capacity > MAX_HISTORY_CAPACITY {
            return Err(CodecError::InvalidHistoryCapacity {
                capacity,
                max: MAX_HISTORY_CAPACITY,
            });
        }
        let slots = (0..capacity)
            .map(|_| Slot {
                tick: Tick::INVALID,
                value: None,
            })
            .collect();
        Ok(Self {
            slots,
            last_stored: Tick::INVALID,
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Newest tick stored so far.
    #[must_use]
    pub const fn last_stored(&self) -> Tick {
        self.last_stored
    }

    /// Stores `value` at `tick`, overwriting the slot unconditionally.
    ///
    /// The slot is fully written before the newest-tick marker moves.
    pub fn store(&mut self, tick: Tick, value: T) -> CodecResult<()> {
        let raw = tick.require("history store")?;
        let index = self.index(raw);
        self.slots[index] = Slot {
            tick,
            value: Some(value),
        };
        if tick.is_newer_than(self.last_stored) {
            self.last_stored = tick;
        }
        Ok(())
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.tick = Tick::INVALID;
            slot.value = None;
        }
        self.last_stored = Tick::INVALID;
    }

    /// Borrows a read-only view.
    #[must_use]
    pub fn view(&self) -> HistoryView<'_, T> {
        HistoryView {
            slots: &self.slots,
            last_stored: self.last_stored,
        }
    }

    /// See [`HistoryView::fetch`].
    #[must_use]
    pub fn fetch(&self, tick: Tick, lookback: u32) -> Option<(Tick, &T)> {
        self.view().fetch(tick, lookback)
    }

    /// See [`HistoryView::get`].
    #[must_use]
    pub fn get(&self, tick: Tick) -> Option<&T> {
        self.view().get(tick)
    }

    /// See [`HistoryView::latest`].
    #[must_use]
    pub fn latest(&self) -> Option<(Tick, &T)> {
        self.view().latest()
    }

    /// See [`HistoryView::iter`].
    pub fn iter(&self) -> impl Iterator<Item = (Tick, &T)> {
        self.view().iter()
    }

    fn index(&self, raw: u32) -> usize {
        raw as usize & (self.slots.len() - 1)
    }
}

/// Read-only view of a [`SnapshotHistory`].
#[derive(Debug)]
pub struct HistoryView<'a, T> {
    slots: &'a [Slot<T>],
    last_stored: Tick,
}

impl<T> Clone for HistoryView<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HistoryView<'_, T> {}

impl<'a, T> HistoryView<'a, T> {
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub const fn last_stored(&self) -> Tick {
        self.last_stored
    }

    /// Returns the slot for `tick - lookback`.
    ///
    /// `tick` is clamped to the newest stored tick and `lookback` to
    /// `capacity - 1`. The entry comes back with the tick it was stored at,
    /// which differs from the requested one if the slot was overwritten.
    #[must_use]
    pub fn fetch(&self, tick: Tick, lookback: u32) -> Option<(Tick, &'a T)> {
        if !self.last_stored.is_valid() || !tick.is_valid() {
            return None;
        }
        let clamped = if tick.is_newer_than(self.last_stored) {
            self.last_stored
        } else {
            tick
        };
        let max_lookback = (self.slots.len() - 1) as u32;
        let target = clamped.subtract(lookback.min(max_lookback));
        let raw = target.raw()?;
        let slot = &self.slots[raw as usize & (self.slots.len() - 1)];
        slot.value.as_ref().map(|value| (slot.tick, value))
    }

    /// Returns the entry stored at exactly `tick`.
    #[must_use]
    pub fn get(&self, tick: Tick) -> Option<&'a T> {
        let raw = tick.raw()?;
        let slot = &self.slots[raw as usize & (self.slots.len() - 1)];
        if slot.tick == tick {
            slot.value.as_ref()
        } else {
            None
        }
    }

    /// Returns the newest entry.
    #[must_use]
    pub fn latest(&self) -> Option<(Tick, &'a T)> {
        self.get(self.last_stored).map(|v| (self.last_stored, v))
    }

    /// Newest entry stored at or before `tick`.
    #[must_use]
    pub fn at_or_before(&self, tick: Tick) -> Option<(Tick, &'a T)> {
        self.iter()
            .filter(|(t, _)| !t.is_newer_than(tick))
            .reduce(|best, entry| if entry.0.is_newer_than(best.0) { entry } else { best })
    }

    /// Oldest entry stored strictly after `tick`.
    #[must_use]
    pub fn after(&self, tick: Tick) -> Option<(Tick, &'a T)> {
        self.iter()
            .filter(|(t, _)| t.is_newer_than(tick))
            .reduce(|best, entry| if best.0.is_newer_than(entry.0) { entry } else { best })
    }

    /// Iterates over stored entries from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = (Tick, &'a T)> + 'a {
        let mut entries: Vec<(Tick, &'a T)> = self
            .slots
            .iter()
            .filter_map(|slot| slot.value.as_ref().map(|v| (slot.tick, v)))
            .collect();
        let newest = self.last_stored;
        entries.sort_by_key(|(tick, _)| newest.ticks_since(*tick).unwrap_or(i32::MAX));
        entries.into_iter()
    }
}
