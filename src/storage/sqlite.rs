//! SQLite sink implementation
//!
//! This module provides the SQLite-backed implementation of the RecordSink
//! trait, plus the query side used by stats and export. Writes are
//! idempotent upserts keyed on the novel URL: re-running a crawl updates
//! listing fields in place, never duplicates a row, and never downgrades a
//! record that already has detail-page data.

use crate::record::{NovelRecord, Platform};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordSink, SinkResult};
use crate::YeonjaeError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;

const NOVEL_COLUMNS: &str = "id, title, author, description, platform, url, keywords, genre,
     is_adult, fetched_detail, first_seen_at, updated_at";

/// A stored novel: the record plus its database bookkeeping columns.
#[derive(Debug, Clone, Serialize)]
pub struct StoredNovel {
    pub id: i64,
    #[serde(flatten)]
    pub record: NovelRecord,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed record sink
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Creates a new SqliteSink instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(YeonjaeError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, YeonjaeError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        // Initialize schema
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, YeonjaeError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Loads every stored novel, oldest row first.
    pub fn load_all(&self) -> Result<Vec<StoredNovel>, YeonjaeError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {NOVEL_COLUMNS} FROM novels ORDER BY id"))?;

        let novels = stmt
            .query_map([], row_to_stored)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(novels)
    }

    /// Loads every stored novel for one platform.
    pub fn load_platform(&self, platform: Platform) -> Result<Vec<StoredNovel>, YeonjaeError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOVEL_COLUMNS} FROM novels WHERE platform = ?1 ORDER BY id"
        ))?;

        let novels = stmt
            .query_map(params![platform.as_str()], row_to_stored)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(novels)
    }

    /// Looks one novel up by its canonical URL.
    pub fn get_by_url(&self, url: &str) -> Result<Option<StoredNovel>, YeonjaeError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOVEL_COLUMNS} FROM novels WHERE url = ?1"
        ))?;

        let novel = stmt.query_row(params![url], row_to_stored).optional()?;

        Ok(novel)
    }

    /// Counts all stored novels.
    pub fn count(&self) -> Result<u64, YeonjaeError> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM novels", [], |row| row.get(0))?;
        Ok(count)
    }

    pub(crate) fn count_where(&self, predicate: &str) -> Result<u64, YeonjaeError> {
        let count: u64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM novels WHERE {predicate}"),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub(crate) fn counts_grouped_by(&self, column: &str) -> Result<Vec<(String, u64)>, YeonjaeError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT COALESCE({column}, '(none)'), COUNT(*) FROM novels
             GROUP BY {column} ORDER BY COUNT(*) DESC, 1"
        ))?;

        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }
}

impl RecordSink for SqliteSink {
    fn write_batch(&mut self, records: &[NovelRecord]) -> SinkResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        // One transaction per batch so a failure leaves no partial batch.
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO novels (title, author, description, platform, url, keywords,
                     genre, is_adult, fetched_detail, first_seen_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                 ON CONFLICT(url) DO UPDATE SET
                     title = excluded.title,
                     author = excluded.author,
                     description = COALESCE(excluded.description, novels.description),
                     platform = excluded.platform,
                     keywords = CASE WHEN excluded.keywords != '[]'
                                     THEN excluded.keywords ELSE novels.keywords END,
                     genre = COALESCE(excluded.genre, novels.genre),
                     is_adult = excluded.is_adult,
                     fetched_detail = MAX(excluded.fetched_detail, novels.fetched_detail),
                     updated_at = excluded.updated_at",
            )?;

            let now = Utc::now().to_rfc3339();
            for record in records {
                let keywords = serde_json::to_string(&record.keywords)?;
                stmt.execute(params![
                    record.title,
                    record.author,
                    record.description,
                    record.platform.as_str(),
                    record.url,
                    keywords,
                    record.genre,
                    record.is_adult,
                    record.fetched_detail,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }
}

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredNovel> {
    let platform_str: String = row.get(4)?;
    let platform = Platform::from_str_opt(&platform_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown platform '{platform_str}'").into(),
        )
    })?;

    let keywords_json: String = row.get(6)?;
    let keywords: Vec<String> = serde_json::from_str(&keywords_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(StoredNovel {
        id: row.get(0)?,
        record: NovelRecord {
            title: row.get(1)?,
            author: row.get(2)?,
            description: row.get(3)?,
            platform,
            url: row.get(5)?,
            keywords,
            genre: row.get(7)?,
            is_adult: row.get(8)?,
            fetched_detail: row.get(9)?,
        },
        first_seen_at: parse_timestamp(row, 10)?,
        updated_at: parse_timestamp(row, 11)?,
    })
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, title: &str) -> NovelRecord {
        NovelRecord {
            title: title.to_string(),
            author: "작가".to_string(),
            description: Some("소개".to_string()),
            platform: Platform::Naver,
            url: url.to_string(),
            keywords: vec!["판타지".to_string()],
            genre: Some("판타지".to_string()),
            is_adult: false,
            fetched_detail: false,
        }
    }

    #[test]
    fn test_write_and_load_roundtrip() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let records = vec![
            record("https://series.naver.com/novel/detail.series?productNo=1", "첫째"),
            record("https://series.naver.com/novel/detail.series?productNo=2", "둘째"),
        ];

        let written = sink.write_batch(&records).unwrap();
        assert_eq!(written, 2);

        let loaded = sink.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].record, records[0]);
        assert_eq!(loaded[1].record.title, "둘째");
    }

    #[test]
    fn test_rewrite_same_url_keeps_one_row() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let url = "https://page.kakao.com/content/53431234";
        let mut first = record(url, "옛 제목");
        first.platform = Platform::Kakao;

        sink.write_batch(&[first.clone()]).unwrap();
        let stored = sink.get_by_url(url).unwrap().unwrap();

        let mut second = first.clone();
        second.title = "새 제목".to_string();
        sink.write_batch(&[second]).unwrap();

        assert_eq!(sink.count().unwrap(), 1);
        let updated = sink.get_by_url(url).unwrap().unwrap();
        assert_eq!(updated.record.title, "새 제목");
        // The first sighting timestamp survives the update.
        assert_eq!(updated.first_seen_at, stored.first_seen_at);
    }

    #[test]
    fn test_rewrite_never_downgrades_detail_fields() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let url = "https://ridibooks.com/books/505012345";

        let mut enriched = record(url, "책");
        enriched.platform = Platform::Ridi;
        enriched.description = Some("전체 줄거리".to_string());
        enriched.keywords = vec!["회귀".to_string(), "성장".to_string()];
        enriched.fetched_detail = true;
        sink.write_batch(&[enriched]).unwrap();

        // A later listing-only pass carries no deep fields.
        let mut shallow = record(url, "책");
        shallow.platform = Platform::Ridi;
        shallow.description = None;
        shallow.keywords = Vec::new();
        shallow.fetched_detail = false;
        sink.write_batch(&[shallow]).unwrap();

        let stored = sink.get_by_url(url).unwrap().unwrap();
        assert_eq!(stored.record.description.as_deref(), Some("전체 줄거리"));
        assert_eq!(stored.record.keywords, vec!["회귀", "성장"]);
        assert!(stored.record.fetched_detail);
    }

    #[test]
    fn test_load_platform_filters() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let mut kakao = record("https://page.kakao.com/content/1", "카카오");
        kakao.platform = Platform::Kakao;
        sink.write_batch(&[record("https://series.naver.com/1", "네이버"), kakao])
            .unwrap();

        let kakao_only = sink.load_platform(Platform::Kakao).unwrap();
        assert_eq!(kakao_only.len(), 1);
        assert_eq!(kakao_only[0].record.title, "카카오");
        assert!(sink.load_platform(Platform::Ridi).unwrap().is_empty());
    }

    #[test]
    fn test_get_by_url_missing() {
        let sink = SqliteSink::new_in_memory().unwrap();
        assert!(sink.get_by_url("https://nowhere.example/1").unwrap().is_none());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        assert_eq!(sink.write_batch(&[]).unwrap(), 0);
        assert_eq!(sink.count().unwrap(), 0);
    }
}
