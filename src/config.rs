//! Tunables for the trace tools. Every field is settable from the CLI.

use crate::error::TraceError;
use crate::record::LogRecord;

/// Batched record reading.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Records pulled from the underlying reader per fill.
    pub batch_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self { batch_size: 20 }
    }
}

impl ReaderConfig {
    /// Largest accepted batch, in records (24 MiB of buffer).
    pub const MAX_BATCH_SIZE: usize = 1 << 20;

    pub fn validate(&self) -> Result<(), TraceError> {
        if self.batch_size == 0 {
            return Err(TraceError::Config("batch size must be at least 1".into()));
        }
        if self.batch_size > Self::MAX_BATCH_SIZE
            || self.batch_size.checked_mul(LogRecord::SIZE).is_none()
        {
            return Err(TraceError::Config(format!(
                "batch size {} exceeds the limit of {} records",
                self.batch_size,
                Self::MAX_BATCH_SIZE
            )));
        }
        Ok(())
    }

    /// Bytes of read buffer this configuration needs.
    pub(crate) fn buffer_len(&self) -> Result<usize, TraceError> {
        self.validate()?;
        self.batch_size
            .checked_mul(LogRecord::SIZE)
            .ok_or_else(|| TraceError::Config("batch size overflows the read buffer".into()))
    }
}

/// Geometry of the simulated cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Total capacity in bytes.
    pub size: usize,
    /// Line size in bytes.
    pub block_size: usize,
    /// Ways per set.
    pub associativity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: 256 * 1024,
            block_size: 64,
            associativity: 8,
        }
    }
}

/// Kernel copy correlation.
#[derive(Debug, Clone)]
pub struct RowcloneConfig {
    /// Kernel copy events kept in the matching window.
    pub window: usize,
    /// Drop a window entry once this many newer entries have matched.
    pub stale_threshold: usize,
    /// Bytes of both loads and stores required before a candidate copy is
    /// accepted.
    pub confidence_bytes: u64,
}

impl Default for RowcloneConfig {
    fn default() -> Self {
        Self {
            window: 200,
            stale_threshold: 20,
            confidence_bytes: 128,
        }
    }
}

impl RowcloneConfig {
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.window == 0 {
            return Err(TraceError::Config("copy window must hold at least one entry".into()));
        }
        Ok(())
    }
}
