//! # Pooled Store & Owner-Scoped Views
//!
//! ## Safety Note
//!
//! This module requires unsafe code for the lock-guarded interior cell.
//! All unsafe blocks are carefully reviewed and documented.
//!
//! ## Access model
//!
//! Every operation on the store holds its lock for the operation's full
//! duration — coarse-grained, store-level locking, not per-chunk. Reads
//! that hand out references ([`Pool::find`], [`Pool::get`], [`Pool::iter`])
//! return guards that keep the lock held until dropped, so a racing erase on
//! another thread blocks instead of invalidating the reference.
//!
//! The lock is reentrant, which makes two same-thread misuses *possible*;
//! both are detected and turned into panics before any state is touched:
//!
//! - mutating the pool while one of its guards is alive on the same thread
//!   (a live borrow count);
//! - calling back into the pool from inside [`Pool::update`]'s closure
//!   (a critical-section flag).

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::error::CoreError;
use crate::handle::{Id, IdManager};
use crate::memory::slab::{ChunkIndex, SlabAllocator, Usage};
use crate::sync::{MutualExclusion, RawLock, SpinLock};

/// Owner tag value; each view gets a unique one from the store.
type OwnerTag = usize;

/// Per-slot bookkeeping. Slot `i` belongs to id `i + 1`.
///
/// A slot is *live* while it references a chunk. The owner tag is
/// independent of liveness: a live slot whose owner has been lost stays
/// live until [`StoreCore::clean`] reclaims it.
#[derive(Default)]
struct SlotState {
    /// Backing chunk while the slot is live.
    chunk: Option<ChunkIndex>,
    /// Owning view, if any.
    owner: Option<OwnerTag>,
}

/// The guarded store state. All methods are plain `&mut self` logic; the
/// locking shell lives in [`PoolStore`].
struct StoreCore<T> {
    /// Backing chunk storage. Its own lock policy is disabled — the store
    /// lock covers every allocator call.
    slab: SlabAllocator<T>,
    /// Slot bookkeeping, indexed by `id.index()`. Grows monotonically and
    /// never shrinks, so issued indices stay valid even after the slab
    /// returns segments to the system.
    slots: Vec<SlotState>,
    /// Handle issue/recycle state.
    ids: IdManager,
    /// Live slot count per owner tag.
    sizes: HashMap<OwnerTag, usize>,
    /// Total live slots (owned or ownerless).
    live: usize,
    /// Tunables fixed at construction.
    config: PoolConfig,
}

impl<T> StoreCore<T> {
    fn new(config: PoolConfig) -> Self {
        Self {
            slab: SlabAllocator::new(config.slab.chunks_per_segment),
            slots: Vec::new(),
            ids: IdManager::new(),
            sizes: HashMap::new(),
            live: 0,
            config,
        }
    }

    /// Resolves `id` to its slot index if the slot is live and owned by
    /// `owner`.
    fn resolve(&self, owner: OwnerTag, id: Id) -> Option<usize> {
        let index = id.index()?;
        let slot = self.slots.get(index)?;
        if slot.chunk.is_some() && slot.owner == Some(owner) {
            Some(index)
        } else {
            None
        }
    }

    fn find(&self, owner: OwnerTag, id: Id) -> Option<&T> {
        let index = self.resolve(owner, id)?;
        let chunk = self.slots[index].chunk?;
        self.slab.get(chunk)
    }

    fn insert(&mut self, owner: OwnerTag, value: T) -> Result<Id, CoreError> {
        if self.slab.usage().chunk.usable == 0 && self.slab.expand(1) == 0 {
            return Err(CoreError::AllocationFailed { requested: 1 });
        }
        let id = self.ids.generate();
        let Some(index) = id.index() else {
            return Err(CoreError::HandleExhausted);
        };
        // Monotonic growth: once position `index` is sized in, it stays
        // valid for the life of the store.
        while self.slots.len() <= index {
            self.slots.push(SlotState::default());
        }
        let Some(chunk) = self.slab.insert(value) else {
            self.ids.release(id);
            return Err(CoreError::AllocationFailed { requested: 1 });
        };
        self.slots[index] = SlotState {
            chunk: Some(chunk),
            owner: Some(owner),
        };
        *self.sizes.entry(owner).or_insert(0) += 1;
        self.live += 1;
        Ok(id)
    }

    fn erase(&mut self, owner: OwnerTag, id: Id) -> bool {
        let Some(index) = self.resolve(owner, id) else {
            return false;
        };
        self.free_slot(index);
        self.maybe_reduce();
        true
    }

    /// Frees a live slot: drops the value, releases the id, clears the tag.
    fn free_slot(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        if let Some(chunk) = slot.chunk.take() {
            self.slab.remove(chunk);
            self.live -= 1;
            if let Some(owner) = slot.owner.take() {
                if let Some(count) = self.sizes.get_mut(&owner) {
                    *count -= 1;
                }
            }
            self.ids.release(Id::from_index(index));
        }
    }

    /// Returns empty segments once free capacity exceeds the high-water
    /// mark (`reduce_watermark` segments worth of chunks).
    fn maybe_reduce(&mut self) {
        let watermark = self.config.reduce_watermark * self.slab.chunks_per_segment();
        if self.slab.usage().chunk.usable > watermark {
            self.slab.reduce();
        }
    }

    fn take(&mut self, owner: OwnerTag, id: Id) -> Option<usize> {
        let index = id.index()?;
        let slot = self.slots.get_mut(index)?;
        slot.chunk?;
        let previous = slot.owner.replace(owner);
        if previous == Some(owner) {
            return Some(index);
        }
        if let Some(previous) = previous {
            if let Some(count) = self.sizes.get_mut(&previous) {
                *count -= 1;
            }
        }
        *self.sizes.entry(owner).or_insert(0) += 1;
        Some(index)
    }

    fn lost(&mut self, index: usize) -> Option<Id> {
        let slot = self.slots.get_mut(index)?;
        slot.chunk?;
        if let Some(owner) = slot.owner.take() {
            if let Some(count) = self.sizes.get_mut(&owner) {
                *count -= 1;
            }
        }
        Some(Id::from_index(index))
    }

    fn leak(&mut self, owner: OwnerTag) -> usize {
        let mut dropped = 0;
        for slot in &mut self.slots {
            if slot.chunk.is_some() && slot.owner == Some(owner) {
                slot.owner = None;
                dropped += 1;
            }
        }
        self.sizes.remove(&owner);
        dropped
    }

    fn clean(&mut self) -> usize {
        let mut reclaimed = 0;
        for index in 0..self.slots.len() {
            if self.slots[index].chunk.is_some() && self.slots[index].owner.is_none() {
                self.free_slot(index);
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            self.maybe_reduce();
        }
        reclaimed
    }

    fn clear(&mut self, owner: OwnerTag) -> usize {
        let mut erased = 0;
        for index in 0..self.slots.len() {
            if self.slots[index].chunk.is_some() && self.slots[index].owner == Some(owner) {
                self.free_slot(index);
                erased += 1;
            }
        }
        if erased > 0 {
            self.maybe_reduce();
        }
        erased
    }

    fn len(&self, owner: OwnerTag) -> usize {
        self.sizes.get(&owner).copied().unwrap_or(0)
    }
}

/// The globally pooled backing store shared by every view.
///
/// Created with [`PoolStore::new`], which returns an [`Arc`] so views and
/// threads can share it; [`PoolStore::view`] mints an owner-scoped
/// [`Pool`].
pub struct PoolStore<T, L: RawLock = SpinLock> {
    /// Guarded state; exclusive access through `lock` plus the misuse checks.
    core: UnsafeCell<StoreCore<T>>,
    /// Lock covering every operation.
    lock: L,
    /// Live read guards ([`ValueRef`], [`PoolIter`]).
    borrows: AtomicUsize,
    /// Set while a user closure runs inside a critical section.
    entered: AtomicBool,
    /// Owner tag source for views.
    next_owner: AtomicUsize,
}

// SAFETY: moving the whole store transfers exclusive ownership; guards
// borrow the store, so none can outlive the move.
unsafe impl<T: Send, L: RawLock> Send for PoolStore<T, L> {}
// SAFETY: all access to `core` happens with the lock held, and
// `MutualExclusion` guarantees the lock actually excludes other threads
// (a no-op policy like `NoLock` is rejected at the type level). Same-thread
// aliasing through the reentrant lock is rejected at runtime (borrow count
// and critical-section flag) before any reference into `core` is created.
unsafe impl<T: Send, L: MutualExclusion> Sync for PoolStore<T, L> {}

impl<T, L: RawLock> PoolStore<T, L> {
    /// Creates a store with the given tunables and a default lock.
    #[must_use]
    pub fn new(config: PoolConfig) -> Arc<Self> {
        Self::with_lock(config, L::default())
    }

    /// Creates a store with an explicitly configured lock.
    #[must_use]
    pub fn with_lock(config: PoolConfig, lock: L) -> Arc<Self> {
        Arc::new(Self {
            core: UnsafeCell::new(StoreCore::new(config)),
            lock,
            borrows: AtomicUsize::new(0),
            entered: AtomicBool::new(false),
            next_owner: AtomicUsize::new(1),
        })
    }

    /// Mints a new owner-scoped view over this store.
    #[must_use]
    pub fn view(self: &Arc<Self>) -> Pool<T, L> {
        Pool {
            store: Arc::clone(self),
            owner: self.next_owner.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Total live slots across all owners (including ownerless ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.read(|core| core.live)
    }

    /// Whether no slot is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupancy snapshot of the backing slab.
    #[must_use]
    pub fn usage(&self) -> Usage {
        self.read(|core| core.slab.usage())
    }

    /// Reclaims every live slot whose owner has been lost. Returns the
    /// number of slots reclaimed.
    pub fn clean(&self) -> usize {
        self.mutate(|core| core.clean())
    }

    /// Runs `f` with shared access to the core, under the lock. The token
    /// releases the lock on every exit path, panics included.
    fn read<R>(&self, f: impl FnOnce(&StoreCore<T>) -> R) -> R {
        let _token = LockToken::acquire(self);
        // SAFETY: lock held. Other threads are serialized; same-thread
        // aliasing is only ever shared-with-shared here (guards hand out
        // `&T`, never `&mut`), which is sound.
        f(unsafe { &*self.core.get() })
    }

    /// Runs `f` with exclusive access to the core, under the lock; the
    /// token releases the lock even when `f` unwinds. Panics if any read
    /// guard is alive (necessarily on this thread — guards on other threads
    /// would still hold the lock).
    fn mutate<R>(&self, f: impl FnOnce(&mut StoreCore<T>) -> R) -> R {
        let _token = LockToken::acquire(self);
        assert!(
            self.borrows.load(Ordering::Acquire) == 0,
            "pool mutated while one of its value references is alive"
        );
        // SAFETY: lock held and no guard outstanding, so no reference into
        // the core exists anywhere.
        f(unsafe { &mut *self.core.get() })
    }

    /// Validates and wraps a value reference, keeping the lock held for the
    /// guard's lifetime.
    fn find_guarded(&self, owner: OwnerTag, id: Id) -> Option<ValueRef<'_, T, L>> {
        let token = LockToken::acquire(self);
        // SAFETY: lock held; shared access (see `read`).
        let core = unsafe { &*self.core.get() };
        match core.find(owner, id) {
            Some(value) => {
                self.borrows.fetch_add(1, Ordering::AcqRel);
                token.keep();
                Some(ValueRef {
                    store: self,
                    value,
                    _not_send: PhantomData,
                })
            }
            // Token drop releases the lock.
            None => None,
        }
    }

    /// Starts a guarded iteration, keeping the lock held until the iterator
    /// is dropped.
    fn iter_guarded(&self, owner: OwnerTag) -> PoolIter<'_, T, L> {
        let token = LockToken::acquire(self);
        self.borrows.fetch_add(1, Ordering::AcqRel);
        token.keep();
        // SAFETY: lock held; shared access (see `read`).
        let core = unsafe { &*self.core.get() };
        PoolIter {
            store: self,
            core,
            owner,
            index: 0,
            _not_send: PhantomData,
        }
    }

    /// Releases one guard: drops the borrow count, then the lock.
    fn release_guard(&self) {
        self.borrows.fetch_sub(1, Ordering::AcqRel);
        self.lock.release();
    }
}

/// Holds the store lock for one operation, releasing it on drop — on the
/// normal return path and on unwind out of a user closure alike.
struct LockToken<'a, T, L: RawLock> {
    /// The store whose lock this token holds.
    store: &'a PoolStore<T, L>,
}

impl<'a, T, L: RawLock> LockToken<'a, T, L> {
    /// Acquires the lock and rejects same-thread reentry from a critical
    /// section. Panics (after releasing) on misuse.
    fn acquire(store: &'a PoolStore<T, L>) -> Self {
        store.lock.acquire();
        if store.entered.load(Ordering::Relaxed) {
            store.lock.release();
            panic!("reentrant pool access from inside an update closure");
        }
        Self { store }
    }

    /// Hands lock ownership over to a longer-lived guard.
    fn keep(self) {
        std::mem::forget(self);
    }
}

impl<T, L: RawLock> Drop for LockToken<'_, T, L> {
    fn drop(&mut self) {
        self.store.lock.release();
    }
}

/// An owner-scoped collection over a shared [`PoolStore`].
///
/// External code references stored values only through [`Id`] handles; a
/// stale handle (erased, recycled away, or owned by another view) is
/// reported as not found, never dereferenced.
///
/// Dropping a view erases everything it owns; use [`Pool::leak`] first to
/// intentionally hand its contents over to [`Pool::clean`].
///
/// # Example
///
/// ```rust,ignore
/// let store = PoolStore::<Widget>::new(PoolConfig::default());
/// let mut pool = store.view();
///
/// let id = pool.insert(widget)?;
/// if let Some(w) = pool.find(id) {
///     draw(&w);
/// }
/// pool.erase(id);
/// ```
pub struct Pool<T, L: RawLock = SpinLock> {
    /// The shared backing store.
    store: Arc<PoolStore<T, L>>,
    /// This view's owner tag.
    owner: OwnerTag,
}

impl<T, L: RawLock> Pool<T, L> {
    /// Creates a view over a fresh private store.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        PoolStore::new(config).view()
    }

    /// The shared store backing this view.
    #[must_use]
    pub fn store(&self) -> &Arc<PoolStore<T, L>> {
        &self.store
    }

    /// Stores `value` and returns its handle.
    ///
    /// Grows the backing slab by one segment when no chunk is free.
    ///
    /// # Errors
    ///
    /// [`CoreError::AllocationFailed`] if the slab cannot grow;
    /// [`CoreError::HandleExhausted`] if the id space is spent.
    pub fn insert(&self, value: T) -> Result<Id, CoreError> {
        self.store.mutate(|core| core.insert(self.owner, value))
    }

    /// Erases the value behind `id`.
    ///
    /// Returns `false` — with no side effects — unless the slot is live and
    /// owned by this view. Erasing the same handle twice fails the second
    /// time. May opportunistically return empty segments to the system.
    pub fn erase(&self, id: Id) -> bool {
        self.store.mutate(|core| core.erase(self.owner, id))
    }

    /// Looks up `id`, returning a guard dereferencing to the value.
    ///
    /// The guard holds the store lock: racing erases block until it drops,
    /// and a same-thread mutation while it is alive panics. `None` for a
    /// handle that is not live in this view.
    #[must_use]
    pub fn find(&self, id: Id) -> Option<ValueRef<'_, T, L>> {
        self.store.find_guarded(self.owner, id)
    }

    /// Strict lookup: like [`Self::find`] but failing loudly.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for a handle that is not live in this view.
    pub fn get(&self, id: Id) -> Result<ValueRef<'_, T, L>, CoreError> {
        self.find(id).ok_or(CoreError::NotFound(id))
    }

    /// Runs `f` on the value behind `id`, mutably, under the lock.
    ///
    /// The closure must not call back into this pool. A panicking closure
    /// releases the lock before unwinding.
    pub fn update<R>(&self, id: Id, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.store.mutate(|core| {
            let index = core.resolve(self.owner, id)?;
            let chunk = core.slots[index].chunk?;
            let value = core.slab.get_mut(chunk)?;
            // Cleared on the way out even if the closure panics.
            struct Reset<'a>(&'a AtomicBool);
            impl Drop for Reset<'_> {
                fn drop(&mut self) {
                    self.0.store(false, Ordering::Relaxed);
                }
            }
            self.store.entered.store(true, Ordering::Relaxed);
            let _reset = Reset(&self.store.entered);
            Some(f(value))
        })
    }

    /// Whether `id` is live and owned by this view.
    #[must_use]
    pub fn contains(&self, id: Id) -> bool {
        self.store.read(|core| core.resolve(self.owner, id).is_some())
    }

    /// Claims the slot behind `id` for this view — from another view or
    /// from no owner — without touching storage. Returns the slot index.
    ///
    /// `None` for a handle with no live slot.
    pub fn take(&self, id: Id) -> Option<usize> {
        self.store.mutate(|core| core.take(self.owner, id))
    }

    /// Clears the owner tag of the live slot at `index`, returning its
    /// handle. The slot stays live and becomes reclaimable by
    /// [`Self::clean`]. `None` for an index with no live slot.
    pub fn lost(&self, index: usize) -> Option<Id> {
        self.store.mutate(|core| core.lost(index))
    }

    /// Drops ownership of everything this view owns, without freeing.
    /// Returns the number of slots released to ownerless state.
    pub fn leak(&self) -> usize {
        self.store.mutate(|core| core.leak(self.owner))
    }

    /// Reclaims every ownerless live slot in the shared store. Returns the
    /// number reclaimed.
    pub fn clean(&self) -> usize {
        self.store.clean()
    }

    /// Erases everything this view owns. Returns the number erased.
    pub fn clear(&self) -> usize {
        self.store.mutate(|core| core.clear(self.owner))
    }

    /// Number of live slots owned by this view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read(|core| core.len(self.owner))
    }

    /// Whether this view owns nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over `(Id, &T)` for every slot this view owns, skipping
    /// free and foreign slots.
    ///
    /// The iterator holds the store lock until dropped; a same-thread
    /// mutation during iteration panics instead of invalidating it.
    #[must_use]
    pub fn iter(&self) -> PoolIter<'_, T, L> {
        self.store.iter_guarded(self.owner)
    }
}

impl<T, L: RawLock> Drop for Pool<T, L> {
    fn drop(&mut self) {
        self.store.mutate(|core| {
            core.clear(self.owner);
        });
    }
}

/// Lock-holding reference to a pooled value.
///
/// Dereferences to `&T`. The store lock is held until the guard drops, so
/// the referent cannot be erased underneath it.
///
/// The guard is not `Send`: the lock it holds must be released by the
/// acquiring thread, so a guard cannot migrate to another one:
///
/// ```compile_fail
/// use kiln_core::{Pool, PoolConfig, SpinLock};
///
/// let pool: Pool<u32, SpinLock> = Pool::new(PoolConfig::default());
/// let id = pool.insert(1).unwrap();
/// let guard = pool.find(id).unwrap();
/// // Does not compile: the guard is pinned to the acquiring thread.
/// std::thread::scope(|s| {
///     s.spawn(move || drop(guard));
/// });
/// ```
#[must_use = "the value is only reachable while the guard is alive"]
pub struct ValueRef<'a, T, L: RawLock> {
    /// The store whose lock this guard holds.
    store: &'a PoolStore<T, L>,
    /// The guarded value.
    value: &'a T,
    /// Pins the guard to the acquiring thread.
    _not_send: PhantomData<*const ()>,
}

impl<T, L: RawLock> Deref for ValueRef<'_, T, L> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.value
    }
}

impl<T, L: RawLock> Drop for ValueRef<'_, T, L> {
    fn drop(&mut self) {
        self.store.release_guard();
    }
}

/// Lock-holding iterator over the slots a view owns.
///
/// Yields `(Id, &T)` in slot order. Like [`ValueRef`], the iterator is not
/// `Send`: the lock it holds must be released by the acquiring thread.
pub struct PoolIter<'a, T, L: RawLock> {
    /// The store whose lock this iterator holds.
    store: &'a PoolStore<T, L>,
    /// Shared access to the guarded state for the iterator's lifetime.
    core: &'a StoreCore<T>,
    /// Owner tag being enumerated.
    owner: OwnerTag,
    /// Next slot index to examine.
    index: usize,
    /// Pins the iterator to the acquiring thread.
    _not_send: PhantomData<*const ()>,
}

impl<'a, T, L: RawLock> Iterator for PoolIter<'a, T, L> {
    type Item = (Id, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.core.slots.len() {
            let index = self.index;
            self.index += 1;
            let slot = &self.core.slots[index];
            if slot.owner != Some(self.owner) {
                continue;
            }
            if let Some(value) = slot.chunk.and_then(|chunk| self.core.slab.get(chunk)) {
                return Some((Id::from_index(index), value));
            }
        }
        None
    }
}

impl<T, L: RawLock> Drop for PoolIter<'_, T, L> {
    fn drop(&mut self) {
        self.store.release_guard();
    }
}
