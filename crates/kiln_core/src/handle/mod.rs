//! # Handle System
//!
//! Recyclable numeric identifiers decoupling external references from
//! internal storage locations.
//!
//! Ids are 1-based; 0 is the reserved invalid sentinel. Released values are
//! eligible for immediate reissue (see [`IdManager`]) — a handle value alone
//! does not prove the referent is still the one the caller remembers. The
//! pooled collections layer their own liveness checks on top.

pub mod id;
mod registry;
pub mod set;
pub mod shared;
pub mod unique;

pub use id::{Id, IdManager};
pub use set::IdSet;
pub use shared::Sid;
pub use unique::Uid;
