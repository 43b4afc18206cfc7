//! # KILN Core
//!
//! Low-level memory and handle layer designed for:
//! - Pooled storage with chunk-level recycling, no per-object heap traffic
//! - Stable, recyclable integer handles instead of raw pointers
//! - Safe sharing across threads under a reentrant spin lock
//!
//! ## Architecture Rules
//!
//! 1. **Index-addressed storage** - Chunks are reached through validated
//!    indices, never through stored pointers, so a stale reference is a
//!    lookup failure rather than undefined behavior
//! 2. **Whole-segment growth** - The slab expands and shrinks in fixed-size
//!    segments, keeping allocation traffic off the hot path
//! 3. **Handles over references** - External code holds [`Id`] values and
//!    resolves them per access through an owning [`Pool`] view
//!
//! ## Example
//!
//! ```rust,ignore
//! use kiln_core::{Pool, PoolConfig};
//!
//! let pool: Pool<Widget> = Pool::new(PoolConfig::default());
//! let id = pool.insert(Widget::new())?;
//! // Handles stay valid until erased, wherever the segment lives
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod handle;
pub mod memory;
pub mod pool;
pub mod sync;

pub use config::{CoreConfig, LockConfig, PoolConfig, SlabConfig};
pub use error::CoreError;
pub use handle::{Id, IdManager, IdSet, Sid, Uid};
pub use memory::{ChunkIndex, SharedSlab, SlabAllocator, Usage};
pub use pool::{Pool, PoolIter, PoolStore, ValueRef};
pub use sync::{MutualExclusion, NoLock, RawLock, SpinGuard, SpinLock};
