//! # Core Error Types
//!
//! All errors that can occur in the memory and handle layer.

use thiserror::Error;

use crate::handle::Id;

/// Errors that can occur in the memory and handle layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Backing memory is exhausted; a segment expansion failed.
    #[error("backing memory exhausted: failed to create {requested} segment(s)")]
    AllocationFailed {
        /// Number of segments the expansion asked for.
        requested: usize,
    },

    /// The id counter space is exhausted; no further handles can be issued.
    #[error("handle space exhausted")]
    HandleExhausted,

    /// The handle is not live in this collection (never issued, already
    /// erased, or owned by a different view).
    #[error("handle {0} not found in this collection")]
    NotFound(Id),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
