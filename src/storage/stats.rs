//! Statistics over the novel store
//!
//! This module provides functionality for extracting and displaying
//! aggregate statistics from the stored catalog.

use crate::record::dedupe_by_title_author;
use crate::storage::sqlite::SqliteSink;
use crate::YeonjaeError;
use serde::Serialize;
use std::collections::HashMap;

/// Catalog statistics summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Total number of stored novels
    pub total: u64,

    /// Number of adult-gated novels
    pub adult: u64,

    /// Number of novels with detail-page fields populated
    pub with_detail: u64,

    /// Distinct works after the case-insensitive title+author collapse
    pub unique_works: u64,

    /// Novel count per platform, largest first
    pub by_platform: Vec<(String, u64)>,

    /// Novel count per genre, largest first ('(none)' groups the untagged)
    pub by_genre: Vec<(String, u64)>,

    /// Most frequent keywords, largest first
    pub top_keywords: Vec<(String, u64)>,
}

/// How many keywords the top-keywords list keeps.
const TOP_KEYWORDS: usize = 10;

/// Loads statistics from the store
///
/// # Arguments
///
/// * `sink` - The store to query
///
/// # Returns
///
/// * `Ok(StoreStats)` - Successfully loaded statistics
/// * `Err(YeonjaeError)` - Failed to query statistics
pub fn load_stats(sink: &SqliteSink) -> Result<StoreStats, YeonjaeError> {
    let novels = sink.load_all()?;

    let mut keyword_counts: HashMap<String, u64> = HashMap::new();
    for novel in &novels {
        for keyword in &novel.record.keywords {
            *keyword_counts.entry(keyword.clone()).or_insert(0) += 1;
        }
    }
    let mut top_keywords: Vec<(String, u64)> = keyword_counts.into_iter().collect();
    top_keywords.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_keywords.truncate(TOP_KEYWORDS);

    let records = novels.into_iter().map(|n| n.record).collect();
    let unique_works = dedupe_by_title_author(records).len() as u64;

    Ok(StoreStats {
        total: sink.count()?,
        adult: sink.count_where("is_adult = 1")?,
        with_detail: sink.count_where("fetched_detail = 1")?,
        unique_works,
        by_platform: sink.counts_grouped_by("platform")?,
        by_genre: sink.counts_grouped_by("genre")?,
        top_keywords,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_stats(stats: &StoreStats) {
    println!("=== Catalog Statistics ===\n");

    println!("Overview:");
    println!("  Total novels: {}", stats.total);
    println!("  Unique works: {}", stats.unique_works);
    println!("  Adult-gated: {}", stats.adult);
    println!("  Detail-fetched: {}", stats.with_detail);
    println!();

    if !stats.by_platform.is_empty() {
        println!("By Platform:");
        for (platform, count) in &stats.by_platform {
            let percentage = if stats.total > 0 {
                (*count as f64 / stats.total as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", platform, count, percentage);
        }
        println!();
    }

    if !stats.by_genre.is_empty() {
        println!("By Genre:");
        for (genre, count) in &stats.by_genre {
            println!("  {}: {}", genre, count);
        }
        println!();
    }

    if !stats.top_keywords.is_empty() {
        println!("Top Keywords:");
        for (keyword, count) in &stats.top_keywords {
            println!("  {}: {}", keyword, count);
        }
    }
}
