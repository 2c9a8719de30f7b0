//! Bookmark record store
//!
//! Wraps a single SQLite connection behind a mutex so the store can be
//! shared by reference across refresh workers. Every write runs inside a
//! savepoint: a failing call rolls back its own changes and nothing else.
//!
//! Writes either commit immediately (`Commit::Now`) or leave the
//! surrounding transaction open (`Commit::Deferred`) so bulk operations can
//! batch many changes and call [`BookmarkStore::commit`] once.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Params, Row};
use tracing::{debug, info};

use super::compact::compact;
use super::error::{StoreError, StoreResult};
use super::schema::{init_schema, needs_init, register_regexp};
use crate::models::{Bookmark, FieldUpdate, NewBookmark, FLAG_IMMUTABLE};
use crate::tags::{self, like_escape, wrap, LIKE_ESCAPE};

/// Column list matching [`row_to_bookmark`]
pub(crate) const COLUMNS: &str = "id, url, title, tags, description, flags";

/// Upper bound on bound parameters per statement
const CHUNK: usize = 500;

/// When a write becomes durable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// Commit as part of this call
    Now,
    /// Leave the transaction open; the caller commits later
    Deferred,
}

/// SQLite-backed bookmark store
pub struct BookmarkStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl BookmarkStore {
    /// Open or create the database file, creating parent directories
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let open_err = |source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        };
        let conn = Connection::open(path).map_err(open_err)?;
        prepare(&conn).map_err(open_err)?;

        debug!(path = %path.display(), "Opened bookmark database");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        prepare(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` inside a savepoint, committing afterwards if asked to
    fn write<T>(
        &self,
        commit: Commit,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let conn = self.lock();
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN")?;
        }
        conn.execute_batch("SAVEPOINT store_write")?;

        let result = f(&conn);
        match &result {
            Ok(_) => conn.execute_batch("RELEASE store_write")?,
            Err(e) => {
                debug!(error = %e, "Write failed, rolling back to savepoint");
                conn.execute_batch("ROLLBACK TO store_write; RELEASE store_write")?;
            }
        }

        if commit == Commit::Now && !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        result
    }

    /// Commit any deferred writes
    pub fn commit(&self) -> StoreResult<()> {
        let conn = self.lock();
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
            debug!("Committed deferred writes");
        }
        Ok(())
    }

    /// Rebuild the database file, reclaiming free pages
    pub fn vacuum(&self) -> StoreResult<()> {
        self.commit()?;
        self.lock().execute_batch("VACUUM")?;
        Ok(())
    }

    // ==================== Reads ====================

    /// Run a bookmark query; columns must be [`COLUMNS`]
    pub(crate) fn select<P: Params>(&self, sql: &str, params: P) -> StoreResult<Vec<Bookmark>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, row_to_bookmark)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_by_id(&self, id: i64) -> StoreResult<Option<Bookmark>> {
        let conn = self.lock();
        let bookmark = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM bookmarks WHERE id = ?1"),
                [id],
                row_to_bookmark,
            )
            .optional()?;
        Ok(bookmark)
    }

    /// Records for the given ids, ascending; missing ids are skipped
    pub fn get_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Bookmark>> {
        load(&self.lock(), Some(ids))
    }

    pub fn get_by_url(&self, url: &str) -> StoreResult<Option<Bookmark>> {
        let conn = self.lock();
        let bookmark = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM bookmarks WHERE url = ?1 LIMIT 1"),
                [url],
                row_to_bookmark,
            )
            .optional()?;
        Ok(bookmark)
    }

    /// Every record, ordered by id
    pub fn get_all(&self) -> StoreResult<Vec<Bookmark>> {
        load(&self.lock(), None)
    }

    /// Highest id in use, 0 for an empty store
    pub fn max_id(&self) -> StoreResult<i64> {
        Ok(max_id(&self.lock())?)
    }

    pub fn count(&self) -> StoreResult<usize> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM bookmarks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Every distinct tag with the number of records carrying it, by name
    pub fn tag_counts(&self) -> StoreResult<Vec<(String, usize)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT tags FROM bookmarks WHERE tags != ','")?;
        let rows = stmt.query_map([], |row| row.get::<_, Option<String>>(0))?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for row in rows {
            if let Some(tag_str) = row? {
                for tag in tags::split(&tag_str) {
                    *counts.entry(tag.to_string()).or_default() += 1;
                }
            }
        }
        Ok(counts.into_iter().collect())
    }

    // ==================== Writes ====================

    /// Insert a record at `max_id + 1`, returning its id
    pub fn insert(&self, record: &NewBookmark, commit: Commit) -> StoreResult<i64> {
        self.write(commit, |conn| {
            let id = max_id(conn)? + 1;
            conn.execute(
                "INSERT INTO bookmarks (id, url, title, tags, description, flags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    record.url,
                    record.title,
                    record.tags,
                    record.description,
                    record.flags
                ],
            )
            .map_err(|e| write_error(conn, e, Some(&record.url)))?;

            debug!(id, url = %record.url, "Inserted bookmark");
            Ok(id)
        })
    }

    /// Write the given fields on the selected records (`None` = all)
    ///
    /// Returns the number of rows changed. A URL may only be written to
    /// exactly one record.
    pub fn update_fields(
        &self,
        ids: Option<&[i64]>,
        update: &FieldUpdate,
        commit: Commit,
    ) -> StoreResult<usize> {
        if update.is_empty() {
            return Ok(0);
        }
        if update.url.is_some() && ids.map_or(true, |ids| ids.len() != 1) {
            return Err(StoreError::InvalidArgument(
                "a URL can only be set on a single record".to_string(),
            ));
        }

        let mut sets = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        let columns = [
            ("url", &update.url),
            ("title", &update.title),
            ("tags", &update.tags),
            ("description", &update.description),
        ];
        for (column, value) in columns {
            if let Some(value) = value {
                sets.push(format!("{column} = ?"));
                values.push(Value::Text(value.clone()));
            }
        }
        match update.immutable {
            Some(true) => sets.push(format!("flags = flags | {FLAG_IMMUTABLE}")),
            Some(false) => sets.push(format!("flags = flags & ~{FLAG_IMMUTABLE}")),
            None => {}
        }
        let set_clause = sets.join(", ");

        self.write(commit, |conn| {
            let url = update.url.as_deref();
            let changed = match ids {
                None => conn
                    .execute(
                        &format!("UPDATE bookmarks SET {set_clause}"),
                        params_from_iter(values.iter()),
                    )
                    .map_err(|e| write_error(conn, e, url))?,
                Some(ids) => {
                    let mut changed = 0;
                    for chunk in ids.chunks(CHUNK) {
                        let sql = format!(
                            "UPDATE bookmarks SET {set_clause} WHERE id IN ({})",
                            placeholders(chunk.len())
                        );
                        let bound = values
                            .iter()
                            .cloned()
                            .chain(chunk.iter().map(|id| Value::Integer(*id)));
                        changed += conn
                            .execute(&sql, params_from_iter(bound))
                            .map_err(|e| write_error(conn, e, url))?;
                    }
                    changed
                }
            };
            debug!(changed, "Updated bookmark fields");
            Ok(changed)
        })
    }

    /// Merge canonical `tags` into the selected records' tag sets
    pub fn append_tags(&self, ids: Option<&[i64]>, tags: &str, commit: Commit) -> StoreResult<usize> {
        self.rewrite_tags(ids, commit, |current| tags::canonicalize([current, tags]))
    }

    /// Drop canonical `tags` from the selected records' tag sets
    pub fn remove_tags(&self, ids: Option<&[i64]>, tags: &str, commit: Commit) -> StoreResult<usize> {
        let unwanted: BTreeSet<&str> = tags::split(tags).collect();
        self.rewrite_tags(ids, commit, |current| {
            tags::canonicalize(tags::split(current).filter(|t| !unwanted.contains(t)))
        })
    }

    /// Replace tag `old` with the canonical `new_tags` on every record
    ///
    /// `new_tags` of `,` removes the tag. Returns the number of records
    /// touched.
    pub fn rename_tag(&self, old: &str, new_tags: &str, commit: Commit) -> StoreResult<usize> {
        let pattern = format!("%{}%", like_escape(&wrap(old)));
        self.write(commit, |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, tags FROM bookmarks WHERE tags LIKE ?1 ESCAPE '{LIKE_ESCAPE}'"
            ))?;
            let matches = stmt
                .query_map([&pattern], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;

            for (id, current) in &matches {
                let kept = tags::split(current).filter(|t| *t != old);
                let tags = tags::canonicalize(kept.chain(tags::split(new_tags)));
                conn.execute(
                    "UPDATE bookmarks SET tags = ?1 WHERE id = ?2",
                    params![tags, id],
                )?;
                info!(id, "Tags updated");
            }
            Ok(matches.len())
        })
    }

    fn rewrite_tags(
        &self,
        ids: Option<&[i64]>,
        commit: Commit,
        f: impl Fn(&str) -> String,
    ) -> StoreResult<usize> {
        self.write(commit, |conn| {
            let targets = load(conn, ids)?;
            for bm in &targets {
                let tags = f(&bm.tags);
                if tags != bm.tags {
                    conn.execute(
                        "UPDATE bookmarks SET tags = ?1 WHERE id = ?2",
                        params![tags, bm.id],
                    )?;
                }
            }
            Ok(targets.len())
        })
    }

    /// Delete one record and compact, returning what was deleted
    pub fn delete_by_id(&self, id: i64, commit: Commit) -> StoreResult<Bookmark> {
        self.write(commit, |conn| {
            let deleted = delete_one(conn, id)?
                .ok_or_else(|| StoreError::NotFound(format!("index {}", id)))?;
            info!(id, "Index deleted");
            Ok(deleted)
        })
    }

    /// Delete an inclusive id range, then compact ascending over it
    pub fn delete_range(&self, low: i64, high: i64, commit: Commit) -> StoreResult<usize> {
        let (low, high) = (low.min(high), low.max(high));
        self.write(commit, |conn| {
            let old_max = max_id(conn)?;
            let deleted = conn.execute(
                "DELETE FROM bookmarks WHERE id BETWEEN ?1 AND ?2",
                params![low, high],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound(format!("index {}-{}", low, high)));
            }
            // Ascending order moves each higher index at most once; the
            // first hole nothing can fill ends the pass
            for id in low..=high.min(old_max) {
                if compact(conn, id)?.is_none() {
                    break;
                }
            }
            info!(low, high, deleted, "Index range deleted");
            Ok(deleted)
        })
    }

    /// Delete a set of records, highest id first, compacting after each
    ///
    /// Missing ids are skipped. Returns the records deleted, in deletion
    /// order.
    pub fn delete_ids(&self, ids: &[i64], commit: Commit) -> StoreResult<Vec<Bookmark>> {
        let mut ordered: Vec<i64> = ids.to_vec();
        ordered.sort_unstable_by(|a, b| b.cmp(a));
        ordered.dedup();

        self.write(commit, |conn| {
            let mut deleted = Vec::new();
            for id in ordered {
                match delete_one(conn, id)? {
                    Some(bm) => deleted.push(bm),
                    None => debug!(id, "No matching index to delete"),
                }
            }
            if deleted.is_empty() && !ids.is_empty() {
                return Err(StoreError::NotFound("index".to_string()));
            }
            info!(count = deleted.len(), "Indices deleted");
            Ok(deleted)
        })
    }

    /// Remove every record
    pub fn delete_all(&self, commit: Commit) -> StoreResult<usize> {
        self.write(commit, |conn| {
            let deleted = conn.execute("DELETE FROM bookmarks", [])?;
            info!(deleted, "All bookmarks deleted");
            Ok(deleted)
        })
    }
}

/// Register functions and make sure the schema exists
fn prepare(conn: &Connection) -> rusqlite::Result<()> {
    register_regexp(conn)?;
    if needs_init(conn) {
        init_schema(conn)?;
    }
    Ok(())
}

/// Records for `ids` (or all), ascending; missing ids are skipped
fn load(conn: &Connection, ids: Option<&[i64]>) -> StoreResult<Vec<Bookmark>> {
    let Some(ids) = ids else {
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM bookmarks ORDER BY id"))?;
        let rows = stmt
            .query_map([], row_to_bookmark)?
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(rows);
    };

    let mut found = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(CHUNK) {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM bookmarks WHERE id IN ({})",
            placeholders(chunk.len())
        ))?;
        let rows = stmt.query_map(params_from_iter(chunk), row_to_bookmark)?;
        for row in rows {
            found.push(row?);
        }
    }
    found.sort_by_key(|bm| bm.id);
    found.dedup_by_key(|bm| bm.id);
    Ok(found)
}

fn max_id(conn: &Connection) -> rusqlite::Result<i64> {
    let max: Option<i64> = conn.query_row("SELECT MAX(id) FROM bookmarks", [], |row| row.get(0))?;
    Ok(max.unwrap_or(0))
}

fn delete_one(conn: &Connection, id: i64) -> StoreResult<Option<Bookmark>> {
    let existing = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM bookmarks WHERE id = ?1"),
            [id],
            row_to_bookmark,
        )
        .optional()?;

    if existing.is_some() {
        conn.execute("DELETE FROM bookmarks WHERE id = ?1", [id])?;
        compact(conn, id)?;
    }
    Ok(existing)
}

/// Map a write failure, resolving the conflicting id for duplicates
fn write_error(conn: &Connection, error: rusqlite::Error, url: Option<&str>) -> StoreError {
    match StoreError::from_write(error, url) {
        StoreError::DuplicateUrl { url, .. } => {
            let id = conn
                .query_row("SELECT id FROM bookmarks WHERE url = ?1", [&url], |row| row.get(0))
                .optional()
                .ok()
                .flatten();
            StoreError::DuplicateUrl { url, id }
        }
        other => other,
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Convert a row selected with [`COLUMNS`]
pub(crate) fn row_to_bookmark(row: &Row<'_>) -> rusqlite::Result<Bookmark> {
    Ok(Bookmark {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        tags: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| tags::DELIM_STR.to_string()),
        description: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        flags: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(url: &str, tags: &str) -> NewBookmark {
        NewBookmark {
            tags: tags::canonicalize([tags]),
            title: format!("Title of {}", url),
            ..NewBookmark::new(url)
        }
    }

    fn seeded(count: usize) -> BookmarkStore {
        let store = BookmarkStore::open_in_memory().unwrap();
        for i in 1..=count {
            store
                .insert(&record(&format!("https://site{}.org", i), "web"), Commit::Now)
                .unwrap();
        }
        store
    }

    fn ids(store: &BookmarkStore) -> Vec<i64> {
        store.get_all().unwrap().iter().map(|b| b.id).collect()
    }

    #[test]
    fn test_store_is_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<BookmarkStore>();
    }

    #[test]
    fn test_insert_and_get() {
        let store = BookmarkStore::open_in_memory().unwrap();
        let id = store.insert(&record("https://a.org", "x, Y"), Commit::Now).unwrap();
        assert_eq!(id, 1);

        let bm = store.get_by_id(1).unwrap().unwrap();
        assert_eq!(bm.url, "https://a.org");
        assert_eq!(bm.tags, ",x,y,");
        assert_eq!(store.get_by_url("https://a.org").unwrap().unwrap().id, 1);
        assert!(store.get_by_id(2).unwrap().is_none());
        assert_eq!(store.max_id().unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_insert_duplicate_reports_existing_index() {
        let store = seeded(2);
        let err = store
            .insert(&record("https://site2.org", ""), Commit::Now)
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateUrl { id: Some(2), .. }));
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_failed_call_keeps_earlier_deferred_writes() {
        let store = BookmarkStore::open_in_memory().unwrap();
        store.insert(&record("https://a.org", ""), Commit::Deferred).unwrap();
        assert!(store
            .insert(&record("https://a.org", ""), Commit::Deferred)
            .is_err());
        store.insert(&record("https://b.org", ""), Commit::Deferred).unwrap();
        store.commit().unwrap();

        assert_eq!(ids(&store), vec![1, 2]);
    }

    #[test]
    fn test_deferred_writes_need_commit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("bookmarks.db");

        {
            let store = BookmarkStore::open(&path).unwrap();
            store.insert(&record("https://a.org", ""), Commit::Deferred).unwrap();
            // Dropped without commit
        }
        {
            let store = BookmarkStore::open(&path).unwrap();
            assert_eq!(store.count().unwrap(), 0);
            store.insert(&record("https://a.org", ""), Commit::Deferred).unwrap();
            store.commit().unwrap();
        }

        let store = BookmarkStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_open_unwritable_directory_is_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = BookmarkStore::open(&blocker.join("sub").join("db.sqlite"))
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::CreateDirectory { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_open_garbage_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookmarks.db");
        std::fs::write(&path, vec![0xAB; 4096]).unwrap();

        let err = BookmarkStore::open(&path).err().unwrap();
        assert!(matches!(err, StoreError::Open { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_update_fields() {
        let store = seeded(3);
        let changed = store
            .update_fields(
                Some(&[1, 3]),
                &FieldUpdate {
                    title: Some("New".to_string()),
                    immutable: Some(true),
                    ..Default::default()
                },
                Commit::Now,
            )
            .unwrap();
        assert_eq!(changed, 2);

        let bm = store.get_by_id(3).unwrap().unwrap();
        assert_eq!(bm.title, "New");
        assert!(bm.is_immutable());
        assert!(!store.get_by_id(2).unwrap().unwrap().is_immutable());

        store
            .update_fields(
                None,
                &FieldUpdate {
                    immutable: Some(false),
                    ..Default::default()
                },
                Commit::Now,
            )
            .unwrap();
        assert!(!store.get_by_id(3).unwrap().unwrap().is_immutable());
    }

    #[test]
    fn test_update_url_rules() {
        let store = seeded(2);
        let update = FieldUpdate {
            url: Some("https://site2.org".to_string()),
            ..Default::default()
        };

        let err = store.update_fields(Some(&[1, 2]), &update, Commit::Now).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        let err = store.update_fields(Some(&[1]), &update, Commit::Now).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUrl { id: Some(2), .. }));
        assert_eq!(store.get_by_id(1).unwrap().unwrap().url, "https://site1.org");
    }

    #[test]
    fn test_update_missing_ids_changes_nothing() {
        let store = seeded(1);
        let changed = store
            .update_fields(
                Some(&[9]),
                &FieldUpdate {
                    title: Some("x".to_string()),
                    ..Default::default()
                },
                Commit::Now,
            )
            .unwrap();
        assert_eq!(changed, 0);
    }

    #[test]
    fn test_delete_compacts() {
        let store = seeded(5);
        let deleted = store.delete_by_id(2, Commit::Now).unwrap();
        assert_eq!(deleted.url, "https://site2.org");

        assert_eq!(ids(&store), vec![1, 2, 3, 4]);
        assert_eq!(store.get_by_id(2).unwrap().unwrap().url, "https://site5.org");

        assert!(matches!(
            store.delete_by_id(9, Commit::Now),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_range_compacts_ascending() {
        let store = seeded(10);
        assert_eq!(store.delete_range(3, 5, Commit::Now).unwrap(), 3);

        assert_eq!(ids(&store), (1..=7).collect::<Vec<_>>());
        let urls: Vec<String> = store.get_all().unwrap().into_iter().map(|b| b.url).collect();
        assert_eq!(urls[2], "https://site10.org");
        assert_eq!(urls[3], "https://site9.org");
        assert_eq!(urls[4], "https://site8.org");
    }

    #[test]
    fn test_delete_range_past_end() {
        let store = seeded(4);
        assert_eq!(store.delete_range(3, 20, Commit::Now).unwrap(), 2);
        assert_eq!(ids(&store), vec![1, 2]);
        assert!(store.delete_range(30, 40, Commit::Now).is_err());
    }

    #[test]
    fn test_delete_range_far_past_end_returns_quickly() {
        let store = seeded(5);
        let started = std::time::Instant::now();

        assert_eq!(store.delete_range(2, 9_999_999_999, Commit::Now).unwrap(), 4);
        assert_eq!(ids(&store), vec![1]);

        let store = seeded(6);
        assert_eq!(store.delete_range(3, 4, Commit::Now).unwrap(), 2);
        assert_eq!(store.delete_range(4, i64::MAX, Commit::Now).unwrap(), 1);
        assert_eq!(ids(&store), vec![1, 2, 3]);

        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_delete_ids_highest_first() {
        let store = seeded(6);
        let deleted = store.delete_ids(&[2, 6, 4], Commit::Now).unwrap();

        let order: Vec<&str> = deleted.iter().map(|b| b.url.as_str()).collect();
        assert_eq!(
            order,
            vec!["https://site6.org", "https://site4.org", "https://site2.org"]
        );
        assert_eq!(ids(&store), vec![1, 2, 3]);

        let urls: BTreeSet<String> = store.get_all().unwrap().into_iter().map(|b| b.url).collect();
        assert!(urls.contains("https://site5.org"));
        assert!(urls.contains("https://site3.org"));
    }

    #[test]
    fn test_delete_all() {
        let store = seeded(3);
        assert_eq!(store.delete_all(Commit::Now).unwrap(), 3);
        assert_eq!(store.max_id().unwrap(), 0);
    }

    #[test]
    fn test_tag_editing() {
        let store = seeded(2);
        store.append_tags(Some(&[1]), ",rust,zed,", Commit::Now).unwrap();
        assert_eq!(store.get_by_id(1).unwrap().unwrap().tags, ",rust,web,zed,");

        store.remove_tags(None, ",web,zed,", Commit::Now).unwrap();
        assert_eq!(store.get_by_id(1).unwrap().unwrap().tags, ",rust,");
        assert_eq!(store.get_by_id(2).unwrap().unwrap().tags, ",");
    }

    #[test]
    fn test_tag_counts() {
        let store = BookmarkStore::open_in_memory().unwrap();
        store.insert(&record("https://a.org", "rust,web"), Commit::Now).unwrap();
        store.insert(&record("https://b.org", "web"), Commit::Now).unwrap();
        store.insert(&record("https://c.org", ""), Commit::Now).unwrap();

        assert_eq!(
            store.tag_counts().unwrap(),
            vec![("rust".to_string(), 1), ("web".to_string(), 2)]
        );
    }

    #[test]
    fn test_rename_tag_is_exact() {
        let store = BookmarkStore::open_in_memory().unwrap();
        store.insert(&record("https://a.org", "cat,dog"), Commit::Now).unwrap();
        store.insert(&record("https://b.org", "category"), Commit::Now).unwrap();

        let touched = store.rename_tag("cat", ",feline,pet,", Commit::Now).unwrap();
        assert_eq!(touched, 1);
        assert_eq!(store.get_by_id(1).unwrap().unwrap().tags, ",dog,feline,pet,");
        assert_eq!(store.get_by_id(2).unwrap().unwrap().tags, ",category,");

        store.rename_tag("dog", ",", Commit::Now).unwrap();
        assert_eq!(store.get_by_id(1).unwrap().unwrap().tags, ",feline,pet,");
    }

    #[test]
    fn test_rename_tag_escapes_wildcards() {
        let store = BookmarkStore::open_in_memory().unwrap();
        store.insert(&record("https://a.org", "a_b"), Commit::Now).unwrap();
        store.insert(&record("https://b.org", "axb"), Commit::Now).unwrap();

        assert_eq!(store.rename_tag("a_b", ",ab,", Commit::Now).unwrap(), 1);
        assert_eq!(store.get_by_id(2).unwrap().unwrap().tags, ",axb,");
    }

    #[test]
    fn test_get_by_ids_skips_missing() {
        let store = seeded(3);
        let found = store.get_by_ids(&[3, 1, 7]).unwrap();
        let found: Vec<i64> = found.iter().map(|b| b.id).collect();
        assert_eq!(found, vec![1, 3]);
    }
}
