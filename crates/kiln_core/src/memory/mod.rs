//! # Memory Management
//!
//! Segmented slab allocation for objects that are frequently allocated and
//! freed. All storage is index-addressed: chunks are referred to by
//! [`ChunkIndex`], never by raw pointer, so freed storage is detected rather
//! than dereferenced.

pub mod shared;
pub mod slab;

pub use shared::SharedSlab;
pub use slab::{ChunkIndex, ChunkUsage, SegmentUsage, SlabAllocator, Usage};
