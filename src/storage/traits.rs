//! Sink traits and error types
//!
//! This module defines the trait interface for record sinks and
//! associated error types.

use crate::record::NovelRecord;
use thiserror::Error;

/// Errors that can occur while persisting records
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Trait for record sink implementations
///
/// The pipeline hands validated record batches to a sink. Writes must be
/// idempotent on the record URL so a re-run updates existing rows instead
/// of duplicating them.
pub trait RecordSink {
    /// Writes one batch of validated records
    ///
    /// # Arguments
    ///
    /// * `records` - The batch to persist
    ///
    /// # Returns
    ///
    /// The number of records the sink accepted
    fn write_batch(&mut self, records: &[NovelRecord]) -> SinkResult<usize>;
}

/// A sink that accepts and discards everything; used for dry runs.
#[derive(Debug, Default)]
pub struct NullSink {
    accepted: usize,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted
    }
}

impl RecordSink for NullSink {
    fn write_batch(&mut self, records: &[NovelRecord]) -> SinkResult<usize> {
        self.accepted += records.len();
        Ok(records.len())
    }
}
