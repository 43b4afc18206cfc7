//! # Exclusive Handles
//!
//! A [`Uid`] binds one live id to one logical holder. It cannot be cloned,
//! and dropping an assigned `Uid` releases its id back to the category's
//! recycle cache — an unreleased handle can never leak the value.

use std::fmt;
use std::marker::PhantomData;

use crate::handle::id::Id;
use crate::handle::registry;

/// Exclusive ownership of one generated id, scoped to category `T`.
///
/// Distinct categories have distinct numbering spaces: `Uid<Widget>` and
/// `Uid<Texture>` both start at 1 and never interact. Move-only by
/// construction (no `Clone`).
///
/// # Example
///
/// ```rust,ignore
/// struct Widget;
///
/// let a = Uid::<Widget>::next();      // issues #1
/// let b = Uid::<Widget>::next();      // issues #2
/// drop(a);                            // #1 back in the recycle cache
/// let c = Uid::<Widget>::next();      // reissues #1
/// ```
pub struct Uid<T: 'static> {
    /// The held id; invalid when unassigned.
    id: Id,
    /// Category marker. `fn() -> T` keeps `Uid` `Send`/`Sync` regardless
    /// of `T`.
    _category: PhantomData<fn() -> T>,
}

impl<T: 'static> Uid<T> {
    /// Issues a fresh id in category `T` and wraps it.
    #[must_use]
    pub fn next() -> Self {
        Self {
            id: registry::with_category::<T, _>(|c| c.manager.generate()),
            _category: PhantomData,
        }
    }

    /// Creates a holder with no id assigned.
    #[must_use]
    pub const fn unassigned() -> Self {
        Self {
            id: Id::INVALID,
            _category: PhantomData,
        }
    }

    /// Returns the value the next [`Self::next`]/[`Self::generate`] in this
    /// category would issue, without consuming it.
    #[must_use]
    pub fn preview() -> Id {
        registry::with_category::<T, _>(|c| c.manager.preview())
    }

    /// Assigns a freshly issued id, releasing any currently held one first.
    pub fn generate(&mut self) {
        self.release();
        self.id = registry::with_category::<T, _>(|c| c.manager.generate());
    }

    /// Releases the held id (if any) back to the category, leaving this
    /// holder unassigned.
    pub fn release(&mut self) {
        if self.id.is_valid() {
            registry::with_category::<T, _>(|c| c.manager.release(self.id));
            self.id = Id::INVALID;
        }
    }

    /// The held id; [`Id::INVALID`] when unassigned.
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
}

impl<T: 'static> Drop for Uid<T> {
    fn drop(&mut self) {
        // Release-on-destroy guard: a holder dropped without an explicit
        // release still returns its id to the category.
        self.release();
    }
}

impl<T: 'static> From<&Uid<T>> for Id {
    fn from(uid: &Uid<T>) -> Self {
        uid.id
    }
}

impl<T: 'static> fmt::Debug for Uid<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Uid").field(&self.id).finish()
    }
}
