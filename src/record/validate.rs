//! Record validation and deduplication
//!
//! Validation normalizes a record and enforces its invariants; records that
//! fail are skipped by the pipeline, never written. Deduplication is stable
//! and first-seen-wins, keyed by canonical URL (the run-level invariant) or
//! by title+author (for cross-platform reporting, where the same work exists
//! under different URLs).

use std::collections::HashSet;

use thiserror::Error;

use super::NovelRecord;

/// Errors raised when a record fails validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("url is not an absolute http(s) link: {0}")]
    InvalidUrl(String),
}

/// Validates one record, returning its normalized form.
///
/// Required fields are title, author, and url, non-empty after whitespace
/// normalization; the url must be absolute http(s). Missing optional fields
/// (description, keywords, genre) are not failures.
///
/// # Arguments
///
/// * `record` - The provisional record assembled by the pipeline
///
/// # Returns
///
/// * `Ok(NovelRecord)` - Normalized, invariant-satisfying record
/// * `Err(ValidationError)` - The record must be skipped
pub fn validate(mut record: NovelRecord) -> Result<NovelRecord, ValidationError> {
    record.normalize();

    if record.title.is_empty() {
        return Err(ValidationError::MissingField("title"));
    }
    if record.author.is_empty() {
        return Err(ValidationError::MissingField("author"));
    }
    if record.url.is_empty() {
        return Err(ValidationError::MissingField("url"));
    }
    if !record.url.starts_with("http://") && !record.url.starts_with("https://") {
        return Err(ValidationError::InvalidUrl(record.url));
    }

    Ok(record)
}

/// Removes duplicate records by canonical URL, keeping the first occurrence.
/// Stable: surviving records keep their relative order.
pub fn dedupe_by_url(records: Vec<NovelRecord>) -> Vec<NovelRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.url.clone()))
        .collect()
}

/// Removes duplicate records by case-insensitive title+author, keeping the
/// first occurrence. Collapses the same work listed on multiple platforms.
pub fn dedupe_by_title_author(records: Vec<NovelRecord>) -> Vec<NovelRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let key = format!(
                "{}|{}",
                record.title.to_lowercase(),
                record.author.to_lowercase()
            );
            seen.insert(key)
        })
        .collect()
}
