//! # Segmented Slab Allocator
//!
//! Fixed-chunk-size allocation without per-object calls to the system
//! allocator. Memory is acquired in *segments* of `chunks_per_segment`
//! chunks; each segment threads its free chunks through a local free list,
//! and empty segments can be returned to the system with [`SlabAllocator::reduce`].
//!
//! ## Design
//!
//! A chunk is an explicit tagged slot inside an index-addressed arena:
//! while free it carries the offset of the next free chunk in its segment,
//! while live it carries the value (or a reservation awaiting one). This
//! keeps the classic O(1) free-list behavior without storing links in the
//! bytes of dead objects.
//!
//! Allocation **never grows the arena implicitly**: when every chunk is in
//! use, [`SlabAllocator::reserve`] fails and the caller decides whether to
//! [`SlabAllocator::expand`]. Growth is fallible and reports the number of
//! segments actually created instead of panicking.
//!
//! ## Thread Safety
//!
//! This allocator is NOT thread-safe. Wrap it in [`SharedSlab`] (or hold it
//! inside an externally locked structure) for cross-thread use.
//!
//! [`SharedSlab`]: crate::memory::SharedSlab

use std::mem;

/// Index of an allocated chunk within a [`SlabAllocator`].
///
/// Stable for the lifetime of the chunk: segments never move live chunks.
/// An index whose chunk has been freed (or whose segment has been reduced)
/// is detected as dead by every accessor; it is never dereferenced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkIndex {
    /// Flattened position: `segment * chunks_per_segment + offset`.
    raw: usize,
}

/// One chunk slot.
///
/// `Reserved` models a chunk that has been handed out but not yet given a
/// value, keeping "allocate" and "construct" separately expressible.
enum Slot<T> {
    /// Chunk is free; carries the segment-local offset of the next free chunk.
    Free {
        /// Next free chunk in this segment, if any.
        next: Option<usize>,
    },
    /// Chunk is handed out but holds no value yet.
    Reserved,
    /// Chunk holds a live value.
    Occupied(T),
}

impl<T> Slot<T> {
    /// Whether the chunk is handed out (reserved or occupied).
    const fn is_live(&self) -> bool {
        !matches!(self, Self::Free { .. })
    }
}

/// A contiguous backing block of `chunks_per_segment` chunks.
struct Segment<T> {
    /// The chunk slots.
    slots: Box<[Slot<T>]>,
    /// Head of this segment's free list (segment-local offset).
    free_head: Option<usize>,
    /// Number of live (reserved or occupied) chunks.
    used: usize,
}

impl<T> Segment<T> {
    /// Builds a fully free segment, or `None` when the backing allocation
    /// cannot be made.
    fn new(chunks: usize) -> Option<Self> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(chunks).ok()?;
        for offset in 0..chunks {
            let next = if offset + 1 < chunks {
                Some(offset + 1)
            } else {
                None
            };
            slots.push(Slot::Free { next });
        }
        Some(Self {
            slots: slots.into_boxed_slice(),
            free_head: Some(0),
            used: 0,
        })
    }
}

/// Chunk occupancy snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkUsage {
    /// Free chunks available without expanding.
    pub usable: usize,
    /// Live (reserved or occupied) chunks.
    pub used: usize,
    /// Total chunks across all live segments.
    pub total: usize,
    /// Size of one chunk in bytes.
    pub bytes: usize,
}

/// Segment occupancy snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentUsage {
    /// Segments with at least one live chunk.
    pub used: usize,
    /// Segments with every chunk live.
    pub full: usize,
    /// Segments with no live chunk (candidates for [`SlabAllocator::reduce`]).
    pub empty: usize,
    /// Live segments.
    pub total: usize,
    /// Total backing bytes across live segments, headers included.
    pub bytes: usize,
}

/// Read-only occupancy snapshot. Telemetry, not authoritative state.
///
/// Callers use `chunk.usable` to decide whether to expand before inserting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    /// Chunk-level occupancy.
    pub chunk: ChunkUsage,
    /// Segment-level occupancy.
    pub segments: SegmentUsage,
}

/// Segmented fixed-chunk allocator.
///
/// # Example
///
/// ```rust,ignore
/// let mut slab: SlabAllocator<Particle> = SlabAllocator::new(64);
///
/// slab.expand(1);                       // one segment of 64 chunks
/// let idx = slab.insert(particle)?;     // O(1), no system allocation
/// let p = slab.get(idx)?;
/// let particle = slab.remove(idx)?;     // O(1), chunk returns to free list
/// slab.reduce();                        // empty segments back to the system
/// ```
pub struct SlabAllocator<T> {
    /// Segment table. `None` entries are holes left by [`Self::reduce`],
    /// reusable by a later [`Self::expand`].
    segments: Vec<Option<Segment<T>>>,
    /// Table holes available for reuse.
    vacant_segment_slots: Vec<usize>,
    /// Segment indices with at least one free chunk. Allocation always takes
    /// from the top, so a partially filled segment is exhausted before a
    /// fresh one is touched.
    available: Vec<usize>,
    /// Chunks carried by each segment.
    chunks_per_segment: usize,
}

impl<T> SlabAllocator<T> {
    /// Creates an empty allocator; no memory is acquired until
    /// [`Self::expand`] is called.
    ///
    /// # Panics
    ///
    /// Panics if `chunks_per_segment` is zero.
    #[must_use]
    pub fn new(chunks_per_segment: usize) -> Self {
        assert!(
            chunks_per_segment > 0,
            "chunks_per_segment must be greater than zero"
        );
        Self {
            segments: Vec::new(),
            vacant_segment_slots: Vec::new(),
            available: Vec::new(),
            chunks_per_segment,
        }
    }

    /// Returns the number of chunks carried by each segment.
    #[inline]
    #[must_use]
    pub const fn chunks_per_segment(&self) -> usize {
        self.chunks_per_segment
    }

    /// Creates `n` new segments, threading every new chunk onto the free
    /// list.
    ///
    /// Returns the number of segments actually created: `0` on backing
    /// allocation failure, never a panic. Partial success is possible when
    /// memory runs out mid-way.
    pub fn expand(&mut self, n: usize) -> usize {
        let mut created = 0;
        for _ in 0..n {
            if !self.new_segment() {
                break;
            }
            created += 1;
        }
        if created > 0 {
            tracing::debug!(
                created,
                segments = self.usage().segments.total,
                "slab expanded"
            );
        }
        created
    }

    /// Releases the backing memory of every segment with no live chunk.
    ///
    /// Returns the number of segments released. Never touches a segment with
    /// a live chunk, so existing [`ChunkIndex`] values stay valid.
    pub fn reduce(&mut self) -> usize {
        let mut released = 0;
        for idx in 0..self.segments.len() {
            let empty = matches!(&self.segments[idx], Some(seg) if seg.used == 0);
            if empty {
                self.segments[idx] = None;
                self.vacant_segment_slots.push(idx);
                released += 1;
            }
        }
        if released > 0 {
            self.available.retain(|idx| self.segments[*idx].is_some());
            tracing::debug!(
                released,
                segments = self.usage().segments.total,
                "slab reduced"
            );
        }
        released
    }

    /// Hands out one free chunk without giving it a value.
    ///
    /// Fails (`None`) when every chunk is in use — growth is the caller's
    /// responsibility, not the allocator's.
    pub fn reserve(&mut self) -> Option<ChunkIndex> {
        let index = self.pop_free()?;
        let (seg_idx, offset) = self.split(index);
        // pop_free only yields live table entries.
        let seg = self.segments[seg_idx].as_mut()?;
        seg.slots[offset] = Slot::Reserved;
        Some(index)
    }

    /// Hands out one free chunk and moves `value` into it.
    ///
    /// Fails (`None`) when every chunk is in use; on failure nothing is left
    /// partially constructed and `value` is dropped with the return.
    pub fn insert(&mut self, value: T) -> Option<ChunkIndex> {
        let index = self.pop_free()?;
        let (seg_idx, offset) = self.split(index);
        let seg = self.segments[seg_idx].as_mut()?;
        seg.slots[offset] = Slot::Occupied(value);
        Some(index)
    }

    /// Takes the value out of an occupied chunk and frees the chunk.
    ///
    /// Returns `None` for a chunk that is not occupied (free, reserved, or
    /// inside a reduced segment) — no double-free is possible.
    pub fn remove(&mut self, index: ChunkIndex) -> Option<T> {
        let (seg_idx, offset) = self.split(index);
        let was_full = {
            let seg = self.segments.get_mut(seg_idx)?.as_mut()?;
            let slot = seg.slots.get_mut(offset)?;
            if !matches!(slot, Slot::Occupied(_)) {
                return None;
            }
            seg.used == seg.slots.len()
        };
        let value = self.free_slot(seg_idx, offset, was_full);
        match value {
            Slot::Occupied(v) => Some(v),
            _ => None,
        }
    }

    /// Frees a reserved or occupied chunk, dropping any value it holds.
    ///
    /// Returns `false` for a chunk that is not live — freeing a stale or
    /// foreign index is detected, not undefined.
    pub fn release(&mut self, index: ChunkIndex) -> bool {
        let (seg_idx, offset) = self.split(index);
        let was_full = {
            let Some(Some(seg)) = self.segments.get_mut(seg_idx) else {
                return false;
            };
            let Some(slot) = seg.slots.get(offset) else {
                return false;
            };
            if !slot.is_live() {
                return false;
            }
            seg.used == seg.slots.len()
        };
        self.free_slot(seg_idx, offset, was_full);
        true
    }

    /// Gets the value in an occupied chunk.
    #[inline]
    #[must_use]
    pub fn get(&self, index: ChunkIndex) -> Option<&T> {
        let (seg_idx, offset) = self.split(index);
        let seg = self.segments.get(seg_idx)?.as_ref()?;
        match seg.slots.get(offset)? {
            Slot::Occupied(value) => Some(value),
            _ => None,
        }
    }

    /// Gets the value in an occupied chunk, mutably.
    #[inline]
    pub fn get_mut(&mut self, index: ChunkIndex) -> Option<&mut T> {
        let (seg_idx, offset) = self.split(index);
        let seg = self.segments.get_mut(seg_idx)?.as_mut()?;
        match seg.slots.get_mut(offset)? {
            Slot::Occupied(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the current occupancy snapshot.
    #[must_use]
    pub fn usage(&self) -> Usage {
        let chunk_bytes = mem::size_of::<Slot<T>>();
        let header_bytes = mem::size_of::<Segment<T>>();
        let mut usage = Usage {
            chunk: ChunkUsage {
                bytes: chunk_bytes,
                ..ChunkUsage::default()
            },
            segments: SegmentUsage::default(),
        };
        for seg in self.segments.iter().flatten() {
            let chunks = seg.slots.len();
            usage.chunk.total += chunks;
            usage.chunk.used += seg.used;
            usage.chunk.usable += chunks - seg.used;
            usage.segments.total += 1;
            usage.segments.bytes += header_bytes + chunks * chunk_bytes;
            if seg.used == 0 {
                usage.segments.empty += 1;
            } else {
                usage.segments.used += 1;
                if seg.used == chunks {
                    usage.segments.full += 1;
                }
            }
        }
        usage
    }

    /// Splits a flattened chunk index into (segment, offset).
    #[inline]
    const fn split(&self, index: ChunkIndex) -> (usize, usize) {
        (
            index.raw / self.chunks_per_segment,
            index.raw % self.chunks_per_segment,
        )
    }

    /// Pops a free chunk off the top available segment, updating the
    /// segment's free list and the available stack. The slot is left in its
    /// `Free` state for the caller to overwrite.
    fn pop_free(&mut self) -> Option<ChunkIndex> {
        let seg_idx = *self.available.last()?;
        let seg = self.segments[seg_idx].as_mut()?;
        let offset = seg.free_head?;
        seg.free_head = match seg.slots[offset] {
            Slot::Free { next } => next,
            // A live slot on the free list would be a bookkeeping bug;
            // stop handing out chunks from this segment.
            _ => None,
        };
        seg.used += 1;
        if seg.used == seg.slots.len() {
            self.available.pop();
        }
        Some(ChunkIndex {
            raw: seg_idx * self.chunks_per_segment + offset,
        })
    }

    /// Returns a live chunk to its segment's free list and restores the
    /// segment to the available stack when it was full. Returns the old
    /// slot contents.
    fn free_slot(&mut self, seg_idx: usize, offset: usize, was_full: bool) -> Slot<T> {
        let seg = match self.segments.get_mut(seg_idx) {
            Some(Some(seg)) => seg,
            // Checked by every caller.
            _ => return Slot::Free { next: None },
        };
        let old = mem::replace(
            &mut seg.slots[offset],
            Slot::Free {
                next: seg.free_head,
            },
        );
        seg.free_head = Some(offset);
        seg.used -= 1;
        if was_full {
            self.available.push(seg_idx);
        }
        old
    }

    /// Builds one segment and registers it, reusing a table hole when one
    /// exists. Returns `false` on backing allocation failure.
    fn new_segment(&mut self) -> bool {
        let Some(seg) = Segment::new(self.chunks_per_segment) else {
            return false;
        };
        if self.available.try_reserve(1).is_err() {
            return false;
        }
        let seg_idx = if let Some(idx) = self.vacant_segment_slots.pop() {
            self.segments[idx] = Some(seg);
            idx
        } else {
            if self.segments.try_reserve(1).is_err() {
                return false;
            }
            self.segments.push(Some(seg));
            self.segments.len() - 1
        };
        self.available.push(seg_idx);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allocator_fails_to_reserve() {
        let mut slab: SlabAllocator<u32> = SlabAllocator::new(4);
        assert!(slab.reserve().is_none());
        assert_eq!(slab.usage(), Usage::default().with_chunk_bytes::<u32>());
    }

    impl Usage {
        /// Test helper: default usage with the chunk byte size filled in.
        fn with_chunk_bytes<T>(mut self) -> Self {
            self.chunk.bytes = std::mem::size_of::<Slot<T>>();
            self
        }
    }

    #[test]
    fn test_expand_accounting() {
        let mut slab: SlabAllocator<u64> = SlabAllocator::new(4);

        assert_eq!(slab.expand(1), 1);
        let usage = slab.usage();
        assert_eq!(usage.chunk.total, 4);
        assert_eq!(usage.chunk.usable, 4);
        assert_eq!(usage.segments.total, 1);
        assert_eq!(usage.segments.empty, 1);

        assert_eq!(slab.expand(3), 3);
        let usage = slab.usage();
        assert_eq!(usage.chunk.total, 16);
        assert_eq!(usage.segments.total, 4);
    }

    #[test]
    fn test_exhaustion_without_expand() {
        // Scenario: one 4-chunk segment, four reservations succeed, the
        // fifth fails because growth is the caller's responsibility.
        let mut slab: SlabAllocator<u32> = SlabAllocator::new(4);
        slab.expand(1);

        for _ in 0..4 {
            assert!(slab.reserve().is_some());
        }
        assert_eq!(slab.usage().chunk.usable, 0);
        assert!(slab.reserve().is_none());
    }

    #[test]
    fn test_insert_get_remove() {
        let mut slab: SlabAllocator<String> = SlabAllocator::new(8);
        slab.expand(1);

        let idx = slab.insert("kiln".to_string()).unwrap();
        assert_eq!(slab.get(idx).unwrap(), "kiln");

        slab.get_mut(idx).unwrap().push_str("_core");
        assert_eq!(slab.get(idx).unwrap(), "kiln_core");

        assert_eq!(slab.remove(idx).unwrap(), "kiln_core");
        assert!(slab.get(idx).is_none());
        assert!(slab.remove(idx).is_none()); // no double-free
    }

    #[test]
    fn test_release_reserved_and_occupied() {
        let mut slab: SlabAllocator<u32> = SlabAllocator::new(4);
        slab.expand(1);

        let reserved = slab.reserve().unwrap();
        let occupied = slab.insert(7).unwrap();
        assert!(slab.release(reserved));
        assert!(slab.release(occupied));
        assert!(!slab.release(occupied)); // stale index detected
        assert_eq!(slab.usage().chunk.used, 0);
    }

    #[test]
    fn test_freed_chunk_is_reused() {
        let mut slab: SlabAllocator<u32> = SlabAllocator::new(2);
        slab.expand(1);

        let a = slab.insert(1).unwrap();
        let _b = slab.insert(2).unwrap();
        assert!(slab.remove(a).is_some());

        let c = slab.insert(3).unwrap();
        assert_eq!(a, c); // same chunk index reused
    }

    #[test]
    fn test_reduce_only_touches_empty_segments() {
        let mut slab: SlabAllocator<u32> = SlabAllocator::new(2);
        slab.expand(2);

        // Fill the first segment, leave the second empty.
        let a = slab.insert(1).unwrap();
        let b = slab.insert(2).unwrap();
        let before = slab.usage();
        assert_eq!(before.segments.full, 1);
        assert_eq!(before.segments.empty, 1);

        assert_eq!(slab.reduce(), 1);
        let after = slab.usage();
        assert_eq!(after.segments.total, 1);
        assert_eq!(after.chunk.used, 2);
        assert_eq!(slab.get(a), Some(&1));
        assert_eq!(slab.get(b), Some(&2));
    }

    #[test]
    fn test_reduce_then_expand_reuses_table_hole() {
        let mut slab: SlabAllocator<u32> = SlabAllocator::new(2);
        slab.expand(2);

        let a = slab.insert(1).unwrap();
        assert_eq!(slab.reduce(), 1); // second segment was empty
        assert_eq!(slab.expand(1), 1); // reuses the hole
        assert_eq!(slab.usage().segments.total, 2);
        assert_eq!(slab.get(a), Some(&1));

        // The revived segment serves fresh chunks.
        for _ in 0..3 {
            assert!(slab.insert(0).is_some());
        }
        assert!(slab.reserve().is_none());
    }

    #[test]
    fn test_index_into_reduced_segment_is_dead() {
        let mut slab: SlabAllocator<u32> = SlabAllocator::new(2);
        slab.expand(1);

        let idx = slab.insert(9).unwrap();
        assert!(slab.remove(idx).is_some());
        assert_eq!(slab.reduce(), 1);

        assert!(slab.get(idx).is_none());
        assert!(!slab.release(idx));
    }

    #[test]
    fn test_partial_segment_filled_before_fresh_one() {
        let mut slab: SlabAllocator<u32> = SlabAllocator::new(2);
        slab.expand(1);

        let a = slab.insert(1).unwrap();
        let b = slab.insert(2).unwrap();
        slab.expand(1);
        assert!(slab.remove(a).is_some());
        assert!(slab.remove(b).is_some());

        // First segment has free chunks and sits on top of the stack.
        let c = slab.insert(3).unwrap();
        assert_eq!(c, b); // last freed, first reused
    }
}
