//! # Id Values & Generation
//!
//! An [`Id`] is a 1-based integer handle; [`IdManager`] issues them with a
//! reuse-before-grow policy that bounds peak handle-space size.

use std::collections::BinaryHeap;
use std::fmt;

/// A 1-based numeric handle. `0` is the reserved invalid sentinel.
///
/// Comparable, totally ordered, cheap to copy. The mapping to storage is
/// `index = value - 1`; see [`Id::index`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Id(usize);

impl Id {
    /// The invalid sentinel.
    pub const INVALID: Self = Self(0);

    /// Creates an id from a raw value. `0` yields [`Id::INVALID`].
    #[inline]
    #[must_use]
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    /// Creates the id addressing the 0-based slot `index`.
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self(index + 1)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> usize {
        self.0
    }

    /// Whether this id is a real handle (not the invalid sentinel).
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Returns the 0-based slot index this id addresses, or `None` for the
    /// invalid sentinel.
    #[inline]
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self.0 {
            0 => None,
            value => Some(value - 1),
        }
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            write!(f, "#invalid")
        }
    }
}

/// Issues and recycles [`Id`] values.
///
/// A monotonically increasing counter plus a recycle cache of released
/// values. Released values are reissued *before* the counter grows, and the
/// cache is a max-heap: the **largest** released value is reissued first
/// (the historical pop order, deliberately kept — see the pinning test).
///
/// No generation or epoch tag is attached: a released value may be reissued
/// immediately, and a caller retaining the old value will observe the new
/// referent. Collections detect staleness with their own liveness checks.
pub struct IdManager {
    /// Next never-issued value.
    next: usize,
    /// Released values eligible for reissue (max-heap).
    cache: BinaryHeap<Id>,
}

impl IdManager {
    /// Creates a manager with no issued ids.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: 1,
            cache: BinaryHeap::new(),
        }
    }

    /// Issues an id: the largest recycled value if any, otherwise the next
    /// counter value.
    ///
    /// Returns [`Id::INVALID`] only when the counter space is exhausted.
    pub fn generate(&mut self) -> Id {
        if let Some(id) = self.cache.pop() {
            return id;
        }
        if self.next == usize::MAX {
            return Id::INVALID;
        }
        let id = Id::new(self.next);
        self.next += 1;
        id
    }

    /// Makes `id` eligible for immediate reissue.
    ///
    /// The caller must pass a currently issued id exactly once; releasing a
    /// value twice (or one never issued) corrupts the recycle cache.
    pub fn release(&mut self, id: Id) {
        debug_assert!(id.is_valid(), "released the invalid sentinel");
        debug_assert!(id.value() < self.next, "released an id that was never issued");
        self.cache.push(id);
    }

    /// Returns the value the next [`Self::generate`] call would issue,
    /// without consuming it.
    #[must_use]
    pub fn preview(&self) -> Id {
        if let Some(id) = self.cache.peek() {
            return *id;
        }
        if self.next == usize::MAX {
            return Id::INVALID;
        }
        Id::new(self.next)
    }

    /// Number of released values waiting for reissue.
    #[inline]
    #[must_use]
    pub fn recycled(&self) -> usize {
        self.cache.len()
    }
}

impl Default for IdManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_index_mapping() {
        assert_eq!(Id::INVALID.index(), None);
        assert_eq!(Id::new(1).index(), Some(0));
        assert_eq!(Id::from_index(41).value(), 42);
        assert!(!Id::default().is_valid());
    }

    #[test]
    fn test_display() {
        assert_eq!(Id::new(7).to_string(), "#7");
        assert_eq!(Id::INVALID.to_string(), "#invalid");
    }

    #[test]
    fn test_generate_is_sequential_without_recycling() {
        let mut ids = IdManager::new();
        assert_eq!(ids.preview(), Id::new(1));
        assert_eq!(ids.generate(), Id::new(1));
        assert_eq!(ids.generate(), Id::new(2));
        assert_eq!(ids.generate(), Id::new(3));
        assert_eq!(ids.preview(), Id::new(4));
    }

    #[test]
    fn test_reuse_before_grow() {
        let mut ids = IdManager::new();
        let a = ids.generate();
        let _b = ids.generate();
        ids.release(a);

        assert_eq!(ids.preview(), a);
        assert_eq!(ids.generate(), a); // recycled before the counter grows
        assert_eq!(ids.generate(), Id::new(3));
    }

    #[test]
    fn test_recycle_pops_largest_first() {
        // The recycle cache is a max-heap: the largest released value comes
        // back first. This pop order is load-bearing for downstream slot
        // bookkeeping and is pinned here on purpose.
        let mut ids = IdManager::new();
        let issued: Vec<Id> = (0..4).map(|_| ids.generate()).collect();

        ids.release(issued[0]);
        ids.release(issued[2]);
        ids.release(issued[1]);

        assert_eq!(ids.generate(), issued[2]);
        assert_eq!(ids.generate(), issued[1]);
        assert_eq!(ids.generate(), issued[0]);
        assert_eq!(ids.recycled(), 0);
    }
}
