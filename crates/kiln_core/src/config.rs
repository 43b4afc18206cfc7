//! # Configuration
//!
//! Tunables for the memory and handle layer, loaded once at startup from
//! TOML (or constructed in code). Every field has a default matching the
//! engine's shipping constants, so a missing section or file is never fatal.

use serde::Deserialize;

use crate::error::CoreError;

/// Default number of chunks per slab segment.
pub const CHUNKS_PER_SEGMENT_DEFAULT: usize = 64;

/// Default number of failed spin attempts before the lock starts sleeping.
pub const SPIN_LIMIT_DEFAULT: u32 = 4000;

/// Default cap on the backoff sleep in microseconds (0 = uncapped).
pub const BACKOFF_LIMIT_US_DEFAULT: u64 = 0;

/// Default free-capacity multiplier that triggers opportunistic reduction.
pub const REDUCE_WATERMARK_DEFAULT: usize = 3;

/// Slab allocator tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SlabConfig {
    /// Number of chunks carried by each segment.
    pub chunks_per_segment: usize,
}

impl Default for SlabConfig {
    fn default() -> Self {
        Self {
            chunks_per_segment: CHUNKS_PER_SEGMENT_DEFAULT,
        }
    }
}

/// Spin lock tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Failed spin attempts before the lock sleeps with backoff.
    pub spin_limit: u32,
    /// Cap on the backoff sleep in microseconds; 0 means uncapped.
    pub backoff_limit_us: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            spin_limit: SPIN_LIMIT_DEFAULT,
            backoff_limit_us: BACKOFF_LIMIT_US_DEFAULT,
        }
    }
}

/// Pooled collection tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Slab settings for the backing store.
    pub slab: SlabConfig,
    /// Free-capacity multiplier (in segments worth of chunks) above which an
    /// erase opportunistically returns empty segments to the system.
    pub reduce_watermark: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            slab: SlabConfig::default(),
            reduce_watermark: REDUCE_WATERMARK_DEFAULT,
        }
    }
}

/// Top-level configuration for the memory and handle layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Spin lock settings.
    pub lock: LockConfig,
    /// Pooled collection settings (includes slab settings).
    pub pool: PoolConfig,
}

impl CoreConfig {
    /// Parses a configuration from a TOML string.
    ///
    /// Missing sections and fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the TOML is malformed or a
    /// value is out of range (see [`Self::validate`]).
    pub fn from_toml_str(text: &str) -> Result<Self, CoreError> {
        let config: Self =
            toml::from_str(text).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that parsing alone cannot enforce, so a bad
    /// config file fails here instead of panicking at first use.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] when
    /// `pool.slab.chunks_per_segment` is zero.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.pool.slab.chunks_per_segment == 0 {
            return Err(CoreError::InvalidConfig(
                "pool.slab.chunks_per_segment must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
