//! Storage module for persisting extracted novels
//!
//! This module handles all database operations for the pipeline, including:
//! - SQLite database initialization and schema management
//! - Idempotent, URL-keyed novel upserts
//! - Catalog statistics and JSONL export
//! - The sink trait the pipeline writes through

mod export;
mod schema;
mod sqlite;
mod stats;
mod traits;

pub use export::export_jsonl;
pub use schema::{get_schema_version, initialize_schema};
pub use sqlite::{SqliteSink, StoredNovel};
pub use stats::{load_stats, print_stats, StoreStats};
pub use traits::{NullSink, RecordSink, SinkError, SinkResult};

use crate::YeonjaeError;
use std::path::Path;

/// Initializes or opens the novel store
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteSink)` - Successfully initialized store
/// * `Err(YeonjaeError)` - Failed to initialize store
pub fn open_store(path: &Path) -> Result<SqliteSink, YeonjaeError> {
    SqliteSink::new(path)
}
