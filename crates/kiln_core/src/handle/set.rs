//! # Sorted Id Set
//!
//! A compact set of ids backed by an amortized-sorted vector: inserts that
//! arrive in ascending order (the common case, since the manager issues
//! sequentially) keep the vector sorted for free, and the first lookup after
//! an out-of-order insert pays one sort. Lookups are binary searches.

use crate::handle::id::Id;

/// Sorted set of valid [`Id`] values.
///
/// Lookup methods take `&mut self` because they may perform the deferred
/// sort; the amortized cost over any sequence of operations is
/// `O(log n)` per lookup plus `O(n log n)` per out-of-order burst.
#[derive(Default)]
pub struct IdSet {
    /// The ids. The first `sorted_len` entries are sorted ascending.
    container: Vec<Id>,
    /// Length of the sorted prefix.
    sorted_len: usize,
}

impl IdSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids in the set.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.container.len()
    }

    /// Whether the set is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }

    /// Inserts `id`. Returns `false` for the invalid sentinel or a value
    /// already present.
    pub fn insert(&mut self, id: Id) -> bool {
        if !id.is_valid() || self.contains(id) {
            return false;
        }
        let keeps_order = self.container.last().map_or(true, |last| *last < id);
        self.container.push(id);
        if keeps_order {
            self.sorted_len = self.container.len();
        }
        true
    }

    /// Removes `id`. Returns `false` when it was not present.
    pub fn erase(&mut self, id: Id) -> bool {
        self.ensure_sorted();
        match self.container.binary_search(&id) {
            Ok(pos) => {
                self.container.remove(pos);
                self.sorted_len = self.container.len();
                true
            }
            Err(_) => false,
        }
    }

    /// Whether `id` is present.
    pub fn contains(&mut self, id: Id) -> bool {
        self.ensure_sorted();
        self.container.binary_search(&id).is_ok()
    }

    /// Returns the id at sorted position `pos`, if any.
    pub fn get(&mut self, pos: usize) -> Option<Id> {
        self.ensure_sorted();
        self.container.get(pos).copied()
    }

    /// Sorts the tail added since the last lookup, if any.
    fn ensure_sorted(&mut self) {
        if self.sorted_len < self.container.len() {
            self.container.sort_unstable();
            self.sorted_len = self.container.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let mut set = IdSet::new();
        assert!(set.insert(Id::new(3)));
        assert!(set.insert(Id::new(1)));
        assert!(set.insert(Id::new(2)));

        assert!(!set.insert(Id::new(2))); // duplicate
        assert!(!set.insert(Id::INVALID)); // sentinel rejected

        assert_eq!(set.len(), 3);
        assert!(set.contains(Id::new(1)));
        assert!(!set.contains(Id::new(9)));
    }

    #[test]
    fn test_sorted_indexed_access() {
        let mut set = IdSet::new();
        for value in [5, 2, 9, 4] {
            set.insert(Id::new(value));
        }
        assert_eq!(set.get(0), Some(Id::new(2)));
        assert_eq!(set.get(3), Some(Id::new(9)));
        assert_eq!(set.get(4), None);
    }

    #[test]
    fn test_erase() {
        let mut set = IdSet::new();
        set.insert(Id::new(1));
        set.insert(Id::new(2));

        assert!(set.erase(Id::new(1)));
        assert!(!set.erase(Id::new(1)));
        assert_eq!(set.len(), 1);
        assert!(set.contains(Id::new(2)));
    }

    #[test]
    fn test_ascending_inserts_never_resort() {
        let mut set = IdSet::new();
        for value in 1..=100 {
            assert!(set.insert(Id::new(value)));
        }
        // Ascending inserts keep the prefix sorted without a deferred sort.
        assert_eq!(set.sorted_len, set.len());
    }
}
