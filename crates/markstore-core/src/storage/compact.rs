//! Index compaction
//!
//! Keeps the id space dense: when a record is deleted from the middle,
//! the record holding the highest id moves into the hole.

use rusqlite::{params, Connection};
use tracing::debug;

use super::error::StoreResult;

/// Fill the hole left by deleting `deleted_id`
///
/// If `deleted_id` is below the current max id, the max-id row is copied
/// into `deleted_id` with identical fields and its old row removed.
/// Returns the id that moved, if any. Must run inside the caller's
/// transaction.
pub fn compact(conn: &Connection, deleted_id: i64) -> StoreResult<Option<i64>> {
    let max_id: Option<i64> = conn.query_row("SELECT MAX(id) FROM bookmarks", [], |row| row.get(0))?;

    let max_id = match max_id {
        Some(max_id) if max_id > deleted_id => max_id,
        _ => return Ok(None),
    };

    // Renumbering in place keeps every other column identical
    conn.execute(
        "UPDATE bookmarks SET id = ?1 WHERE id = ?2",
        params![deleted_id, max_id],
    )?;

    debug!(from = max_id, to = deleted_id, "Index moved");
    Ok(Some(max_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::init_schema;

    fn seeded(count: i64) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        for id in 1..=count {
            conn.execute(
                "INSERT INTO bookmarks (id, url, title, tags) VALUES (?1, ?2, ?3, ',t,')",
                params![id, format!("https://site{}.org", id), format!("Site {}", id)],
            )
            .unwrap();
        }
        conn
    }

    fn ids(conn: &Connection) -> Vec<i64> {
        conn.prepare("SELECT id FROM bookmarks ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_compact_moves_last_into_hole() {
        let conn = seeded(5);
        conn.execute("DELETE FROM bookmarks WHERE id = 2", []).unwrap();

        assert_eq!(compact(&conn, 2).unwrap(), Some(5));
        assert_eq!(ids(&conn), vec![1, 2, 3, 4]);

        let url: String = conn
            .query_row("SELECT url FROM bookmarks WHERE id = 2", [], |row| row.get(0))
            .unwrap();
        assert_eq!(url, "https://site5.org");
    }

    #[test]
    fn test_compact_noop_for_last_index() {
        let conn = seeded(3);
        conn.execute("DELETE FROM bookmarks WHERE id = 3", []).unwrap();

        assert_eq!(compact(&conn, 3).unwrap(), None);
        assert_eq!(ids(&conn), vec![1, 2]);
    }

    #[test]
    fn test_compact_empty_table() {
        let conn = seeded(1);
        conn.execute("DELETE FROM bookmarks", []).unwrap();
        assert_eq!(compact(&conn, 1).unwrap(), None);
    }
}
