//! Database schema definitions
//!
//! This module contains the SQL schema for the Yeonjae novel store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per discovered novel, keyed by canonical URL
CREATE TABLE IF NOT EXISTS novels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    description TEXT,
    platform TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    keywords TEXT NOT NULL DEFAULT '[]',
    genre TEXT,
    is_adult INTEGER NOT NULL DEFAULT 0,
    fetched_detail INTEGER NOT NULL DEFAULT 0,
    first_seen_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_novels_platform ON novels(platform);
CREATE INDEX IF NOT EXISTS idx_novels_genre ON novels(genre);
CREATE INDEX IF NOT EXISTS idx_novels_url ON novels(url);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Gets the current schema version
///
/// This can be used for future migrations if the schema changes.
pub fn get_schema_version() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        let result = initialize_schema(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Initialize twice
        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        // Should succeed the second time too
        assert!(result.is_ok());
    }

    #[test]
    fn test_novels_table_exists_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='novels'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_url_column_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let insert = "INSERT INTO novels (title, author, platform, url, first_seen_at, updated_at)
                      VALUES ('a', 'b', 'naver', 'https://x.example/1', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')";
        conn.execute(insert, []).unwrap();
        let duplicate = conn.execute(insert, []);
        assert!(duplicate.is_err());
    }
}
