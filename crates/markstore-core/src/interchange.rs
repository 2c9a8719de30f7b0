//! Import and export
//!
//! The store is agnostic to file formats: converters produce
//! [`ImportRecord`]s through [`ImportSource`] and consume
//! [`ExportRecord`]s through [`ExportSink`]. A [`BookmarkStore`] is itself
//! a source (database merge) and a sink (database export).
//!
//! A refresh run can capture records for a follow-up export. Redirected
//! records are exported with their old URL noted in the title, records
//! deleted on error with a `(DELETED)` marker.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::{Bookmark, NewBookmark};
use crate::storage::{BookmarkStore, Commit, StoreResult};

/// One record read by an importer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub url: String,
    /// `None` takes the fetched title
    #[serde(default)]
    pub title: Option<String>,
    /// Raw comma-separated tags
    #[serde(default)]
    pub tags: String,
    /// `None` takes the fetched description
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub flags: i64,
    /// Fetch page metadata while adding
    #[serde(default)]
    pub fetch: bool,
    /// Keep the URL as given; otherwise follow permanent redirects
    #[serde(default = "default_true")]
    pub url_is_final: bool,
}

fn default_true() -> bool {
    true
}

impl ImportRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            tags: String::new(),
            description: None,
            flags: 0,
            fetch: false,
            url_is_final: true,
        }
    }
}

impl From<Bookmark> for ImportRecord {
    fn from(bm: Bookmark) -> Self {
        Self {
            url: bm.url,
            title: Some(bm.title),
            tags: bm.tags,
            description: Some(bm.description),
            flags: bm.flags,
            fetch: false,
            url_is_final: true,
        }
    }
}

/// One record handed to an exporter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub url: String,
    pub title: String,
    pub tags: String,
    pub description: String,
    pub flags: i64,
}

impl From<&Bookmark> for ExportRecord {
    fn from(bm: &Bookmark) -> Self {
        Self {
            url: bm.url.clone(),
            title: bm.title.clone(),
            tags: bm.tags.clone(),
            description: bm.description.clone(),
            flags: bm.flags,
        }
    }
}

/// Produces records to import
pub trait ImportSource {
    fn read_records(&mut self) -> StoreResult<Vec<ImportRecord>>;
}

/// Consumes exported records
pub trait ExportSink {
    fn write_record(&mut self, record: &ExportRecord) -> StoreResult<()>;

    /// Flush whatever the sink buffers
    fn finish(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

impl ImportSource for Vec<ImportRecord> {
    fn read_records(&mut self) -> StoreResult<Vec<ImportRecord>> {
        Ok(std::mem::take(self))
    }
}

impl ExportSink for Vec<ExportRecord> {
    fn write_record(&mut self, record: &ExportRecord) -> StoreResult<()> {
        self.push(record.clone());
        Ok(())
    }
}

impl ImportSource for BookmarkStore {
    fn read_records(&mut self) -> StoreResult<Vec<ImportRecord>> {
        Ok(self.get_all()?.into_iter().map(ImportRecord::from).collect())
    }
}

impl ExportSink for BookmarkStore {
    fn write_record(&mut self, record: &ExportRecord) -> StoreResult<()> {
        let new = NewBookmark {
            url: record.url.clone(),
            title: record.title.clone(),
            tags: record.tags.clone(),
            description: record.description.clone(),
            flags: record.flags,
        };
        self.insert(&new, Commit::Deferred)?;
        Ok(())
    }

    fn finish(&mut self) -> StoreResult<()> {
        self.commit()
    }
}

// ==================== Refresh capture ====================

/// What a refresh run recorded for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    /// Record now lives at the key URL; this was its URL before
    Redirected { old_url: String },
    /// Record was deleted on error; snapshot taken before deletion
    Deleted(Bookmark),
}

/// Records captured by a refresh, keyed by their current URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportCapture {
    entries: BTreeMap<String, Captured>,
}

impl ExportCapture {
    pub fn record_redirect(&mut self, new_url: impl Into<String>, old_url: impl Into<String>) {
        self.entries.insert(
            new_url.into(),
            Captured::Redirected {
                old_url: old_url.into(),
            },
        );
    }

    pub fn record_deleted(&mut self, bookmark: Bookmark) {
        self.entries
            .insert(bookmark.url.clone(), Captured::Deleted(bookmark));
    }

    pub fn get(&self, url: &str) -> Option<&Captured> {
        self.entries.get(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold another capture into this one; later entries win
    pub fn merge(&mut self, other: ExportCapture) {
        self.entries.extend(other.entries);
    }

    /// Build annotated export records against the current store contents
    ///
    /// Redirect entries whose record is no longer in `current` are dropped.
    pub fn resolve(&self, current: &[Bookmark]) -> Vec<ExportRecord> {
        let by_url: HashMap<&str, &Bookmark> =
            current.iter().map(|bm| (bm.url.as_str(), bm)).collect();

        self.entries
            .iter()
            .filter_map(|(url, captured)| match captured {
                Captured::Deleted(bm) => {
                    let mut record = ExportRecord::from(bm);
                    record.title.push_str(" (DELETED)");
                    Some(record)
                }
                Captured::Redirected { old_url } => {
                    let bm = by_url.get(url.as_str())?;
                    let mut record = ExportRecord::from(*bm);
                    if old_url != url {
                        record.title.push_str(&format!(" (OLD URL = {})", old_url));
                    }
                    Some(record)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bookmark(id: i64, url: &str, title: &str) -> Bookmark {
        Bookmark {
            title: title.to_string(),
            ..Bookmark::new(id, url)
        }
    }

    #[test]
    fn test_import_record_defaults() {
        let record: ImportRecord = serde_json::from_str(r#"{"url": "https://a.org"}"#).unwrap();
        assert_eq!(record, ImportRecord::new("https://a.org"));
        assert!(record.url_is_final);
        assert!(!record.fetch);
    }

    #[test]
    fn test_capture_annotations() {
        let mut capture = ExportCapture::default();
        capture.record_redirect("https://new.org", "https://old.org");
        capture.record_redirect("https://same.org", "https://same.org");
        capture.record_deleted(bookmark(9, "https://gone.org", "Gone"));

        let current = vec![
            bookmark(1, "https://new.org", "New"),
            bookmark(2, "https://same.org", "Same"),
            bookmark(3, "https://other.org", "Other"),
        ];

        let records = capture.resolve(&current);
        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Gone (DELETED)", "New (OLD URL = https://old.org)", "Same"]
        );
    }

    #[test]
    fn test_capture_drops_missing_redirects() {
        let mut capture = ExportCapture::default();
        capture.record_redirect("https://vanished.org", "https://old.org");
        assert!(capture.resolve(&[]).is_empty());
        assert_eq!(capture.len(), 1);
    }

    #[test]
    fn test_store_as_source_and_sink() {
        let mut source = BookmarkStore::open_in_memory().unwrap();
        source
            .insert(
                &NewBookmark {
                    title: "A".to_string(),
                    tags: ",x,".to_string(),
                    ..NewBookmark::new("https://a.org")
                },
                Commit::Now,
            )
            .unwrap();

        let records = source.read_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title.as_deref(), Some("A"));
        assert!(!records[0].fetch);

        let mut sink = BookmarkStore::open_in_memory().unwrap();
        let bm = source.get_by_id(1).unwrap().unwrap();
        sink.write_record(&ExportRecord::from(&bm)).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.get_by_url("https://a.org").unwrap().unwrap().tags, ",x,");
    }

    #[test]
    fn test_vec_source_drains() {
        let mut source = vec![ImportRecord::new("https://a.org")];
        assert_eq!(source.read_records().unwrap().len(), 1);
        assert!(source.read_records().unwrap().is_empty());
    }
}
