//! markstore Core Library
//!
//! This crate provides the core functionality for markstore, a local
//! bookmark store with tagged search and concurrent metadata refresh.
//!
//! # Architecture
//!
//! - **SQLite**: one table of bookmark records, ids kept dense on delete
//! - **Fetcher**: page metadata comes from a pluggable [`fetch::Fetcher`]
//! - **Refresh**: bulk network refresh runs on a scoped worker pool
//!
//! # Quick Start
//!
//! ```text
//! let store = Store::open()?;
//!
//! // Add a bookmark
//! let id = store.add(&AddRequest::new("https://example.com"))?;
//!
//! // Search
//! let hits = store.search_by_tag("rust,web")?;
//! ```
//!
//! # Modules
//!
//! - `store`: Unified storage interface (main entry point)
//! - `models`: Bookmark records and field updates
//! - `tags`: Canonical tag strings
//! - `selection`: Index and status-code selections
//! - `storage`: SQLite persistence and id compaction
//! - `search`: Keyword, regex and tag queries
//! - `fetch`: Page fetching and metadata scraping
//! - `refresh`: Concurrent metadata refresh
//! - `update`: Add, update, delete, import and export
//! - `interchange`: Import/export record contract
//! - `config`: Application configuration

pub mod config;
pub mod fetch;
pub mod interchange;
pub mod models;
pub mod refresh;
pub mod search;
pub mod selection;
pub mod storage;
pub mod store;
pub mod tags;
pub mod update;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, FetchConfig};
pub use fetch::{FetchResult, Fetcher, HttpFetcher, StatusTag};
pub use interchange::{ExportCapture, ExportRecord, ExportSink, ImportRecord, ImportSource};
pub use models::{Bookmark, FieldUpdate, NewBookmark};
pub use refresh::{CancellationToken, RefreshOptions, RefreshReport};
pub use search::SearchMode;
pub use selection::{Selection, StatusSet};
pub use storage::{BookmarkStore, Commit, StoreError, StoreResult};
pub use store::Store;
pub use tags::TagEdit;
pub use update::{AddRequest, ImportOptions, ImportSummary, UpdateOutcome, UpdateRequest};
