//! Storage error handling
//!
//! Provides typed errors for store operations with descriptive messages
//! and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// URL is already bookmarked; nothing was written
    #[error("URL '{url}' already exists{}", .id.map(|id| format!(" at index {}", id)).unwrap_or_default())]
    DuplicateUrl { url: String, id: Option<i64> },

    /// Index or URL is absent; nothing was written
    #[error("No matching {0}")]
    NotFound(String),

    /// URL rejected before any network access
    #[error("Malformed URL: '{0}'")]
    MalformedUrl(String),

    /// Fetch produced no response at all (connection error, timeout)
    #[error("Network failure for '{url}': {reason}")]
    Network { url: String, reason: String },

    /// Fetch returned a status the caller asked to reject
    #[error("HTTP error {status} for '{url}'")]
    HttpStatus { url: String, status: u16 },

    /// Conflicting or malformed caller input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to open or initialize the database file
    #[error("Failed to open database '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Map a SQLite error raised by a write touching `url`
    ///
    /// Unique-constraint violations become `DuplicateUrl`; everything else
    /// stays a database error.
    pub fn from_write(error: rusqlite::Error, url: Option<&str>) -> Self {
        match (&error, url) {
            (rusqlite::Error::SqliteFailure(e, _), Some(url))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::DuplicateUrl {
                    url: url.to_string(),
                    id: None,
                }
            }
            _ => StoreError::Database(error),
        }
    }

    /// Storage could not be initialized; the process cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::CreateDirectory { .. } | StoreError::Open { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::DuplicateUrl { .. } => {
                Some("Update the existing bookmark instead of adding it again.")
            }
            StoreError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            StoreError::Open { .. } => Some(
                "Check that the database file is not locked, encrypted or corrupted, and that you can write to it.",
            ),
            StoreError::Network { .. } => Some("Check your connection or proxy settings."),
            _ => None,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
