//! Import and export command handlers
//!
//! Files ending in `.db` are markstore databases; anything else is read
//! and written as a JSON array of records.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use markstore_core::{
    Bookmark, ExportCapture, ExportRecord, ExportSink, ImportOptions, ImportRecord, ImportSource,
    Selection, Store, StoreError, StoreResult,
};

use crate::output::Output;
use crate::prompt::confirm;

/// JSON array of bookmark records on disk
pub struct JsonFile {
    path: PathBuf,
    pending: Vec<ExportRecord>,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: Vec::new(),
        }
    }
}

impl ImportSource for JsonFile {
    fn read_records(&mut self) -> StoreResult<Vec<ImportRecord>> {
        let content = fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| {
            StoreError::InvalidArgument(format!("{}: {}", self.path.display(), e))
        })
    }
}

impl ExportSink for JsonFile {
    fn write_record(&mut self, record: &ExportRecord) -> StoreResult<()> {
        self.pending.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(&self.pending)
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
        fs::write(&self.path, json)?;
        self.pending.clear();
        Ok(())
    }
}

fn is_database(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "db")
}

/// Import bookmarks from a JSON file or merge another database
pub fn import(
    store: &Store,
    file: &Path,
    auto_tag: bool,
    append_tags: bool,
    output: &Output,
) -> Result<()> {
    let summary = if is_database(file) {
        store.merge_db(file)?
    } else {
        let options = ImportOptions {
            auto_tag,
            append_tags_on_duplicate: append_tags,
        };
        store.import(&mut JsonFile::new(file), &options)?
    };

    if output.is_json() {
        println!(
            "{}",
            serde_json::json!({
                "added": summary.added,
                "merged": summary.merged,
                "skipped": summary.skipped,
                "auto_tag": summary.auto_tag,
            })
        );
        return Ok(());
    }

    output.success(&format!(
        "Imported {} bookmark(s), {} merged, {} skipped",
        summary.added, summary.merged, summary.skipped
    ));
    if let Some(tag) = summary.auto_tag {
        output.message(&format!("Auto-generated tag: {}", tag));
    }
    Ok(())
}

/// Export the selected bookmarks
pub fn export(
    store: &Store,
    file: &Path,
    indices: &[String],
    yes: bool,
    output: &Output,
) -> Result<()> {
    let selection = Selection::parse(indices)?;
    let records = match selection {
        Selection::All => None,
        _ => Some(store.get_selection(&selection)?),
    };

    let count = write(store, file, records.as_deref(), None, yes, output)?;
    if count > 0 {
        output.success(&format!("Exported {} bookmark(s) to {}", count, file.display()));
    }
    Ok(())
}

/// Write a refresh capture to `file`
pub fn export_capture(
    store: &Store,
    file: &Path,
    capture: &ExportCapture,
    yes: bool,
    output: &Output,
) -> Result<()> {
    if capture.is_empty() {
        output.message("No bookmarks matched the export statuses.");
        return Ok(());
    }
    let count = write(store, file, None, Some(capture), yes, output)?;
    if count > 0 {
        output.success(&format!("Exported {} bookmark(s) to {}", count, file.display()));
    }
    Ok(())
}

fn write(
    store: &Store,
    file: &Path,
    records: Option<&[Bookmark]>,
    capture: Option<&ExportCapture>,
    yes: bool,
    output: &Output,
) -> Result<usize> {
    if is_database(file) {
        return store.export_db(file, records, capture);
    }

    if file.exists() && !yes && output.should_prompt() {
        if !confirm(&format!("{} exists. Overwrite?", file.display()))? {
            println!("Cancelled.");
            return Ok(0);
        }
    }
    store
        .export(&mut JsonFile::new(file), records, capture)
        .with_context(|| format!("Failed to write {}", file.display()))
}
