//! Unified storage interface
//!
//! The `Store` ties together the configuration, the bookmark database and
//! the page fetcher, and is the entry point for applications.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open()?;
//!
//! let id = store.add(&AddRequest::new("https://example.com"))?;
//! let hits = store.search(&["example"], SearchMode::Any, false)?;
//! ```

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::interchange::{ExportCapture, ExportSink, ImportSource};
use crate::models::Bookmark;
use crate::refresh::{CancellationToken, RefreshOptions, RefreshReport};
use crate::search::{SearchEngine, SearchMode};
use crate::selection::Selection;
use crate::storage::{BookmarkStore, Commit};
use crate::update::{
    AddRequest, ImportOptions, ImportSummary, UpdateEngine, UpdateOutcome, UpdateRequest,
};

/// Unified storage interface for markstore
pub struct Store {
    /// The bookmark database
    db: BookmarkStore,
    /// Page metadata source
    fetcher: Box<dyn Fetcher>,
    /// Configuration
    config: Config,
    /// Shared with refresh workers and the interrupt handler
    cancel: CancellationToken,
}

impl Store {
    /// Open the store at the configured location
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the store with a specific configuration and the HTTP fetcher
    pub fn open_with_config(config: Config) -> Result<Self> {
        let fetcher =
            HttpFetcher::new(&config.fetch).context("Failed to build the HTTP client")?;
        Self::open_with_fetcher(config, Box::new(fetcher))
    }

    /// Open the store with a custom fetcher
    pub fn open_with_fetcher(config: Config, fetcher: Box<dyn Fetcher>) -> Result<Self> {
        let path = config.db_path();
        let db = BookmarkStore::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        Ok(Self {
            db,
            fetcher,
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token that stops running refreshes and imports when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Direct access to the bookmark database
    pub fn bookmarks(&self) -> &BookmarkStore {
        &self.db
    }

    fn engine(&self) -> UpdateEngine<'_> {
        UpdateEngine::new(&self.db, self.fetcher.as_ref(), &self.cancel)
    }

    fn search_engine(&self) -> SearchEngine<'_> {
        SearchEngine::new(&self.db)
    }

    // ==================== Bookmark Operations ====================

    /// Add a bookmark, returning its index
    pub fn add(&self, request: &AddRequest) -> Result<i64> {
        self.engine()
            .add(request, Commit::Now)
            .with_context(|| format!("Failed to add {}", request.url))
    }

    /// Update the selected bookmarks
    pub fn update(&self, selection: &Selection, request: &UpdateRequest) -> Result<UpdateOutcome> {
        self.engine()
            .update(selection, request)
            .context("Failed to update bookmarks")
    }

    /// Refresh metadata of the selected bookmarks from the network
    pub fn refresh(&self, selection: &Selection, options: &RefreshOptions) -> Result<RefreshReport> {
        self.engine()
            .refresh(selection, options)
            .context("Failed to refresh bookmarks")
    }

    /// Delete the selected bookmarks, returning how many went
    pub fn delete(&self, selection: &Selection) -> Result<usize> {
        self.engine()
            .delete(selection)
            .context("Failed to delete bookmarks")
    }

    /// Get a bookmark by index
    pub fn get(&self, id: i64) -> Result<Option<Bookmark>> {
        self.db.get_by_id(id).context("Failed to get bookmark")
    }

    /// Get the selected bookmarks, ordered by index
    pub fn get_selection(&self, selection: &Selection) -> Result<Vec<Bookmark>> {
        let records = self
            .db
            .max_id()
            .and_then(|max_id| match selection.ids_within(max_id) {
                None => self.db.get_all(),
                Some(ids) => self.db.get_by_ids(&ids),
            });
        records.context("Failed to get bookmarks")
    }

    /// Count of bookmarks
    pub fn count(&self) -> Result<usize> {
        self.db.count().context("Failed to count bookmarks")
    }

    // ==================== Search ====================

    /// Keyword search over url, title, tags and description
    pub fn search<S: AsRef<str>>(
        &self,
        keywords: &[S],
        mode: SearchMode,
        deep: bool,
    ) -> Result<Vec<Bookmark>> {
        self.search_engine()
            .search(keywords, mode, deep)
            .context("Search failed")
    }

    /// Tag expression search (`a,b`, `a+b`, `a - c`, `- c`)
    pub fn search_by_tag(&self, expr: &str) -> Result<Vec<Bookmark>> {
        self.search_engine()
            .search_by_tag(expr)
            .context("Tag search failed")
    }

    /// Keyword search restricted to a tag expression, ordered by index
    pub fn search_with_tags<S: AsRef<str>>(
        &self,
        keywords: &[S],
        mode: SearchMode,
        deep: bool,
        tag_expr: &str,
    ) -> Result<Vec<Bookmark>> {
        self.search_engine()
            .search_with_tags(keywords, mode, deep, tag_expr)
            .context("Search failed")
    }

    /// Remove results matching any of `without`
    pub fn exclude<S: AsRef<str>>(
        &self,
        results: Vec<Bookmark>,
        without: &[S],
        deep: bool,
    ) -> Result<Vec<Bookmark>> {
        self.search_engine()
            .exclude(results, without, deep)
            .context("Exclusion search failed")
    }

    // ==================== Tag Operations ====================

    /// Tags with usage counts, sorted by tag
    pub fn tag_counts(&self) -> Result<Vec<(String, usize)>> {
        self.db.tag_counts().context("Failed to get tag counts")
    }

    /// Replace a tag everywhere; an empty replacement removes it
    pub fn replace_tag(&self, old: &str, new: &[&str]) -> Result<usize> {
        self.engine()
            .replace_tag(old, new)
            .with_context(|| format!("Failed to replace tag '{}'", old))
    }

    // ==================== Import / Export ====================

    /// Import records from any source
    pub fn import(
        &self,
        source: &mut dyn ImportSource,
        options: &ImportOptions,
    ) -> Result<ImportSummary> {
        self.engine()
            .import(source, options)
            .context("Import failed")
    }

    /// Merge another markstore database into this one
    pub fn merge_db(&self, path: &Path) -> Result<ImportSummary> {
        let mut other = BookmarkStore::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        self.import(&mut other, &ImportOptions::default())
    }

    /// Export records (all when `None`) or a refresh capture to a sink
    pub fn export(
        &self,
        sink: &mut dyn ExportSink,
        records: Option<&[Bookmark]>,
        capture: Option<&ExportCapture>,
    ) -> Result<usize> {
        self.engine()
            .export(sink, records, capture)
            .context("Export failed")
    }

    /// Export into a new markstore database file
    pub fn export_db(
        &self,
        path: &Path,
        records: Option<&[Bookmark]>,
        capture: Option<&ExportCapture>,
    ) -> Result<usize> {
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        let mut target = BookmarkStore::open(path)
            .with_context(|| format!("Failed to create database at {}", path.display()))?;
        self.export(&mut target, records, capture)
    }

    // ==================== Maintenance ====================

    /// Rebuild the database file
    pub fn vacuum(&self) -> Result<()> {
        self.db.vacuum().context("Failed to vacuum database")
    }
}
