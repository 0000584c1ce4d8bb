//! Wrapping simulation ticks.

use std::fmt;

use crate::error::{CodecError, CodecResult};

/// A simulation tick on a wrapping 32-bit counter, or the invalid sentinel.
///
/// Ticks are ordered modulo 2^32 through [`is_newer_than`](Self::is_newer_than);
/// there is deliberately no `Ord` impl. Arithmetic on the invalid tick yields
/// the invalid tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tick(Option<u32>);

impl Tick {
    /// The invalid tick, used where no tick exists yet.
    pub const INVALID: Self = Self(None);

    /// Creates a valid tick.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(Some(raw))
    }

    /// Returns `true` unless this is [`Tick::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0.is_some()
    }

    /// Returns the raw counter value, if valid.
    #[must_use]
    pub const fn raw(self) -> Option<u32> {
        self.0
    }

    /// Returns the raw counter value or an [`CodecError::InvalidTick`] naming `context`.
    pub fn require(self, context: &'static str) -> CodecResult<u32> {
        self.0.ok_or(CodecError::InvalidTick { context })
    }

    /// Advances by one tick, wrapping at the 32-bit boundary.
    pub fn increment(&mut self) {
        *self = self.add(1);
    }

    /// Steps back by one tick, wrapping at zero.
    pub fn decrement(&mut self) {
        *self = self.subtract(1);
    }

    /// Returns the tick `delta` steps later.
    #[must_use]
    pub fn add(self, delta: u32) -> Self {
        Self(self.0.map(|raw| raw.wrapping_add(delta)))
    }

    /// Returns the tick `delta` steps earlier.
    #[must_use]
    pub fn subtract(self, delta: u32) -> Self {
        Self(self.0.map(|raw| raw.wrapping_sub(delta)))
    }

    /// Signed distance from `older` to `self`, interpreted modulo 2^32.
    ///
    /// Returns `None` if either tick is invalid.
    #[must_use]
    pub fn ticks_since(self, older: Self) -> Option<i32> {
        match (self.0, older.0) {
            (Some(a), Some(b)) => Some(a.wrapping_sub(b) as i32),
            _ => None,
        }
    }

    /// Returns `true` if `self` is after `other` on the wrapping counter.
    ///
    /// Invalid ticks are never newer than anything, and every valid tick is
    /// newer than the invalid one.
    #[must_use]
    pub fn is_newer_than(self, other: Self) -> bool {
        match (self.0, other.0) {
            (Some(a), Some(b)) => (a.wrapping_sub(b) as i32) > 0,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl From<u32> for Tick {
    fn from(raw: u32) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(raw) => write!(f, "{raw}"),
            None => write!(f, "invalid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_than_across_wraparound() {
        assert!(Tick::new(5).is_newer_than(Tick::new(u32::MAX)));
        assert!(!Tick::new(u32::MAX).is_newer_than(Tick::new(5)));
        assert!(Tick::new(10).is_newer_than(Tick::new(9)));
        assert!(!Tick::new(9).is_newer_than(Tick::new(9)));
    }

    #[test]
    fn decrement_wraps_at_zero() {
        let mut tick = Tick::new(0);
        tick.decrement();
        assert_eq!(tick, Tick::new(u32::MAX));
        tick.increment();
        assert_eq!(tick, Tick::new(0));
    }

    #[test]
    fn invalid_stays_invalid() {
        let mut tick = Tick::INVALID;
        tick.increment();
        assert!(!tick.is_valid());
        assert_eq!(Tick::INVALID.add(5), Tick::INVALID);
        assert_eq!(Tick::INVALID.subtract(5), Tick::INVALID);
        assert_eq!(Tick::default(), Tick::INVALID);
    }

    #[test]
    fn invalid_ordering() {
        assert!(Tick::new(0).is_newer_than(Tick::INVALID));
        assert!(!Tick::INVALID.is_newer_than(Tick::new(0)));
        assert!(!Tick::INVALID.is_newer_than(Tick::INVALID));
    }

    #[test]
    fn ticks_since_is_signed() {
        assert_eq!(Tick::new(2).ticks_since(Tick::new(u32::MAX - 1)), Some(4));
        assert_eq!(Tick::new(u32::MAX - 1).ticks_since(Tick::new(2)), Some(-4));
        assert_eq!(Tick::new(2).ticks_since(Tick::INVALID), None);
    }

    #[test]
    fn require_reports_context() {
        assert_eq!(Tick::new(7).require("store"), Ok(7));
        assert_eq!(
            Tick::INVALID.require("store"),
            Err(CodecError::InvalidTick { context: "store" })
        );
    }

    #[test]
    fn display() {
        assert_eq!(Tick::new(12).to_string(), "12");
        assert_eq!(Tick::INVALID.to_string(), "invalid");
    }
}
