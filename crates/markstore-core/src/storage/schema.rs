//! SQLite schema for the bookmark store
//!
//! One table of URL records plus a small key/value table tracking the
//! schema version. The connection also gets a `REGEXP` function so regex
//! searches can run inside SQLite.

use regex::RegexBuilder;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Bookmarks: id is dense and kept so by compaction on delete
        CREATE TABLE IF NOT EXISTS bookmarks (
            id INTEGER PRIMARY KEY,
            url TEXT NOT NULL UNIQUE,
            title TEXT DEFAULT '',
            tags TEXT DEFAULT ',',
            description TEXT DEFAULT '',
            flags INTEGER DEFAULT 0
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

/// Register `expr REGEXP pattern` (case-insensitive) on the connection
///
/// The compiled pattern is cached per statement. Non-text values never
/// match.
pub fn register_regexp(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

            let re = ctx.get_or_create_aux(0, |vr| -> std::result::Result<_, BoxError> {
                Ok(RegexBuilder::new(vr.as_str()?)
                    .case_insensitive(true)
                    .build()?)
            })?;

            let matched = match ctx.get_raw(1) {
                ValueRef::Text(text) => std::str::from_utf8(text)
                    .map(|s| re.is_match(s))
                    .unwrap_or(false),
                _ => false,
            };
            Ok(matched)
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"bookmarks".to_string()));
        assert!(tables.contains(&"schema_info".to_string()));
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();

        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));
    }

    #[test]
    fn test_column_defaults() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute("INSERT INTO bookmarks (id, url) VALUES (1, 'https://a.org')", [])
            .unwrap();
        let (title, tags, desc, flags): (String, String, String, i64) = conn
            .query_row(
                "SELECT title, tags, description, flags FROM bookmarks WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();

        assert_eq!(title, "");
        assert_eq!(tags, ",");
        assert_eq!(desc, "");
        assert_eq!(flags, 0);
    }

    #[test]
    fn test_url_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute("INSERT INTO bookmarks (id, url) VALUES (1, 'x')", [])
            .unwrap();
        assert!(conn
            .execute("INSERT INTO bookmarks (id, url) VALUES (2, 'x')", [])
            .is_err());
    }

    #[test]
    fn test_regexp_function() {
        let conn = Connection::open_in_memory().unwrap();
        register_regexp(&conn).unwrap();

        let hit: bool = conn
            .query_row("SELECT 'Rust Book' REGEXP 'rust\\s+b'", [], |row| row.get(0))
            .unwrap();
        assert!(hit);

        let miss: bool = conn
            .query_row("SELECT NULL REGEXP 'x'", [], |row| row.get(0))
            .unwrap();
        assert!(!miss);
    }
}
