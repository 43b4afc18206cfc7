//! # Shared Slab Allocator
//!
//! Lock-policy wrapper around [`SlabAllocator`] for cross-thread use.
//!
//! ## Safety Note
//!
//! This module requires unsafe code for the lock-guarded interior cell.
//! All unsafe blocks are carefully reviewed and documented.
//!
//! ## Access model
//!
//! Every operation holds the lock for its full duration. The operation
//! surface is index-only — no reference escapes a critical section; value
//! access goes through short closures ([`SharedSlab::with`],
//! [`SharedSlab::with_mut`]) executed under the lock.
//!
//! The lock is reentrant, so a same-thread callback into the same slab
//! would not deadlock — it would alias the guarded state instead. A
//! reentrancy flag turns that misuse into a panic before any state is
//! touched.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::memory::slab::{ChunkIndex, SlabAllocator, Usage};
use crate::sync::{MutualExclusion, RawLock, SpinLock};

/// A [`SlabAllocator`] shareable across threads under a type-level lock
/// policy.
///
/// With [`SpinLock`] every operation is mutually exclusive; with
/// [`crate::sync::NoLock`] the locking cost is compiled away for
/// single-threaded use.
pub struct SharedSlab<T, L: RawLock = SpinLock> {
    /// The guarded allocator. Exclusive access is guaranteed by `lock`
    /// plus the reentrancy flag.
    inner: UnsafeCell<SlabAllocator<T>>,
    /// Lock covering every operation.
    lock: L,
    /// Set while a critical section is running; catches same-thread
    /// reentry through the reentrant lock.
    entered: AtomicBool,
}

// SAFETY: moving the whole slab transfers exclusive ownership; no aliasing
// can outlive the move because no reference escapes a critical section.
unsafe impl<T: Send, L: RawLock> Send for SharedSlab<T, L> {}
// SAFETY: `&SharedSlab` only exposes lock-serialized operations, and
// `MutualExclusion` guarantees the lock actually excludes other threads.
// A no-op policy like `NoLock` is rejected here at the type level.
unsafe impl<T: Send, L: MutualExclusion> Sync for SharedSlab<T, L> {}

/// Critical-section token: holds the lock and the reentrancy flag, and
/// clears the flag on drop (including on unwind out of a closure).
struct Critical<'a, T, L: RawLock> {
    slab: &'a SharedSlab<T, L>,
}

impl<'a, T, L: RawLock> Critical<'a, T, L> {
    fn enter(slab: &'a SharedSlab<T, L>) -> Self {
        slab.lock.acquire();
        let was_entered = slab.entered.swap(true, Ordering::Relaxed);
        if was_entered {
            // Drop the nested acquisition before unwinding so the outer
            // critical section can still release cleanly.
            slab.lock.release();
            panic!("reentrant access to SharedSlab from inside one of its own operations");
        }
        Self { slab }
    }

    /// Gives mutable access to the allocator for the token's lifetime.
    fn allocator(&mut self) -> &mut SlabAllocator<T> {
        // SAFETY: the lock is held and the reentrancy flag proves no other
        // reference into `inner` is live on this thread.
        unsafe { &mut *self.slab.inner.get() }
    }
}

impl<T, L: RawLock> Drop for Critical<'_, T, L> {
    fn drop(&mut self) {
        self.slab.entered.store(false, Ordering::Relaxed);
        self.slab.lock.release();
    }
}

impl<T, L: RawLock> SharedSlab<T, L> {
    /// Creates an empty shared slab with the default lock state.
    ///
    /// # Panics
    ///
    /// Panics if `chunks_per_segment` is zero.
    #[must_use]
    pub fn new(chunks_per_segment: usize) -> Self {
        Self {
            inner: UnsafeCell::new(SlabAllocator::new(chunks_per_segment)),
            lock: L::default(),
            entered: AtomicBool::new(false),
        }
    }

    /// Creates `n` new segments. Returns the count actually created
    /// (0 on backing allocation failure).
    pub fn expand(&self, n: usize) -> usize {
        Critical::enter(self).allocator().expand(n)
    }

    /// Releases every empty segment, returning the count released.
    pub fn reduce(&self) -> usize {
        Critical::enter(self).allocator().reduce()
    }

    /// Hands out one free chunk without a value; `None` when exhausted.
    pub fn reserve(&self) -> Option<ChunkIndex> {
        Critical::enter(self).allocator().reserve()
    }

    /// Hands out one free chunk holding `value`; `None` when exhausted.
    pub fn insert(&self, value: T) -> Option<ChunkIndex> {
        Critical::enter(self).allocator().insert(value)
    }

    /// Takes the value out of an occupied chunk and frees it.
    pub fn remove(&self, index: ChunkIndex) -> Option<T> {
        Critical::enter(self).allocator().remove(index)
    }

    /// Frees a reserved or occupied chunk; `false` for a dead index.
    pub fn release(&self, index: ChunkIndex) -> bool {
        Critical::enter(self).allocator().release(index)
    }

    /// Returns the current occupancy snapshot.
    #[must_use]
    pub fn usage(&self) -> Usage {
        Critical::enter(self).allocator().usage()
    }

    /// Runs `f` on the value in an occupied chunk, under the lock.
    ///
    /// The closure must not call back into this slab.
    pub fn with<R>(&self, index: ChunkIndex, f: impl FnOnce(&T) -> R) -> Option<R> {
        let mut section = Critical::enter(self);
        section.allocator().get(index).map(f)
    }

    /// Runs `f` on the value in an occupied chunk, mutably, under the lock.
    ///
    /// The closure must not call back into this slab.
    pub fn with_mut<R>(&self, index: ChunkIndex, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut section = Critical::enter(self);
        section.allocator().get_mut(index).map(f)
    }
}
