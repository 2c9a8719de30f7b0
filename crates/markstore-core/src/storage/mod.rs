//! Storage layer
//!
//! A single SQLite table of bookmarks behind one writer mutex.
//!
//! ## Layout
//!
//! - `schema`: table definitions, version tracking, the `REGEXP` function
//! - `bookmarks`: the record store (insert, lookup, update, delete)
//! - `compact`: keeps ids dense after deletes
//! - `error`: typed store errors

pub mod bookmarks;
pub mod compact;
pub mod error;
pub mod schema;

pub use bookmarks::{BookmarkStore, Commit};
pub use error::{StoreError, StoreResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
