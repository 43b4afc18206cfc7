//! # Shared Handles
//!
//! A [`Sid`] is a reference-counted claim on an id value: copies share the
//! claim, and the id is released back to its category only when the last
//! copy is dropped.

use std::fmt;
use std::marker::PhantomData;

use crate::handle::id::Id;
use crate::handle::registry;

/// Shared ownership of one id in category `T`.
///
/// The category keeps a map from id value to refcount. [`Sid::next`]
/// creates a fresh entry with count 1, [`Clone`] increments, and the last
/// [`Drop`] removes the entry and releases the id for reissue.
pub struct Sid<T: 'static> {
    /// The shared id; invalid when unassigned.
    id: Id,
    /// Category marker.
    _category: PhantomData<fn() -> T>,
}

impl<T: 'static> Sid<T> {
    /// Issues a fresh id in category `T` and starts its refcount at 1.
    #[must_use]
    pub fn next() -> Self {
        let id = registry::with_category::<T, _>(|c| {
            let id = c.manager.generate();
            if id.is_valid() {
                c.refcounts.insert(id, 1);
            }
            id
        });
        Self {
            id,
            _category: PhantomData,
        }
    }

    /// Creates-or-finds the shared entry for `id` and joins it.
    ///
    /// The value must have been issued in category `T` (for example through
    /// a [`Uid`](crate::handle::Uid) whose ownership is being converted);
    /// joining a never-issued value corrupts the category's recycle cache
    /// when the last copy drops. The invalid sentinel yields an unassigned
    /// handle.
    #[must_use]
    pub fn insert(id: Id) -> Self {
        if id.is_valid() {
            registry::with_category::<T, _>(|c| {
                *c.refcounts.entry(id).or_insert(0) += 1;
            });
        }
        Self {
            id,
            _category: PhantomData,
        }
    }

    /// The shared id; [`Id::INVALID`] when unassigned.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> Id {
        self.id
    }

    /// Whether an id is currently held.
    #[inline]
    #[must_use]
    pub const fn is_assigned(&self) -> bool {
        self.id.is_valid()
    }

    /// Current number of copies sharing `id` in category `T`; 0 when the
    /// value has no live shared entry.
    #[must_use]
    pub fn strong_count(id: Id) -> usize {
        if !id.is_valid() {
            return 0;
        }
        registry::with_category::<T, _>(|c| c.refcounts.get(&id).copied().unwrap_or(0))
    }
}

impl<T: 'static> Clone for Sid<T> {
    fn clone(&self) -> Self {
        Self::insert(self.id)
    }
}

impl<T: 'static> Drop for Sid<T> {
    fn drop(&mut self) {
        if !self.id.is_valid() {
            return;
        }
        registry::with_category::<T, _>(|c| {
            let Some(count) = c.refcounts.get_mut(&self.id) else {
                return;
            };
            *count -= 1;
            if *count == 0 {
                c.refcounts.remove(&self.id);
                c.manager.release(self.id);
            }
        });
    }
}

impl<T: 'static> fmt::Debug for Sid<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sid").field(&self.id).finish()
    }
}
