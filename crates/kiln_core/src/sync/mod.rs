//! # Synchronization Primitives
//!
//! Busy-wait mutual exclusion for short critical sections.
//!
//! The lock policy is selected at the type level: components generic over
//! [`RawLock`] pay for locking only when instantiated with [`SpinLock`];
//! the [`NoLock`] policy compiles the cost away for single-threaded use.

pub mod spin;

pub use spin::{MutualExclusion, NoLock, RawLock, SpinGuard, SpinLock};
