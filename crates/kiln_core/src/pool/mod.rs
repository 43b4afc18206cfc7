//! # Handle-Indexed Pooled Collections
//!
//! Values live in one globally pooled store ([`PoolStore`]) and are
//! addressed only by [`Id`](crate::handle::Id) — never by raw pointer or
//! internal index. Each [`Pool`] is an owner-scoped view over the store:
//! slots carry an owner tag, and a view only sees, erases, and iterates what
//! it owns. Ownership can move between views ([`Pool::take`]) or be dropped
//! without freeing ([`Pool::lost`], [`Pool::leak`]) and later reclaimed
//! ([`Pool::clean`]).
//!
//! Insert, erase, lookup are O(1) amortized; a stale or foreign handle is
//! reported as "not found", never dereferenced.

pub mod store;

pub use store::{Pool, PoolIter, PoolStore, ValueRef};
