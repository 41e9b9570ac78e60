//! Per-entity event flags collected between synchronization points.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bit set describing what happened to an entity.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventFlags(u32);

impl EventFlags {
    pub const NONE: Self = Self(0);
    pub const CREATE: Self = Self(1);
    pub const DESTROY: Self = Self(1 << 1);
    pub const EDIT: Self = Self(1 << 2);

    /// Flags from raw bits. Bits above `EDIT` are free for callers.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for EventFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Local, not yet synchronized edits, keyed by entity id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    entries: BTreeMap<u64, EventFlags>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `flags` into the entry for `id`. Empty flags are ignored.
    pub fn record(&mut self, id: u64, flags: EventFlags) {
        if !flags.is_empty() {
            *self.entries.entry(id).or_default() |= flags;
        }
    }

    pub fn get(&self, id: u64) -> EventFlags {
        self.entries.get(&id).copied().unwrap_or_default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, EventFlags)> + '_ {
        self.entries.iter().map(|(&id, &flags)| (id, flags))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate_per_entity() {
        let mut log = ChangeLog::new();
        log.record(7, EventFlags::CREATE);
        log.record(7, EventFlags::EDIT);
        log.record(3, EventFlags::NONE);
        assert_eq!(log.len(), 1);
        assert!(log.get(7).contains(EventFlags::CREATE | EventFlags::EDIT));
        assert!(!log.get(7).intersects(EventFlags::DESTROY));
        assert!(log.get(3).is_empty());
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn flags_serialize_as_bits() {
        let flags = EventFlags::CREATE | EventFlags::from_bits(1 << 8);
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, "257");
        let back: EventFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
    }
}
