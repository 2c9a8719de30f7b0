//! Data models for markstore
//!
//! Defines the persisted bookmark record and the partial-update shape
//! used by the store. Rows are converted into these types once, at the
//! storage boundary.

use serde::{Deserialize, Serialize};

use crate::tags::{self, DELIM_STR};

/// No flags set
pub const FLAG_NONE: i64 = 0;

/// Title is immutable: network refresh never touches it
pub const FLAG_IMMUTABLE: i64 = 0b0000_0001;

/// A stored bookmark
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bookmark {
    /// Dense positive index
    pub id: i64,
    /// The URL (unique across the store)
    pub url: String,
    /// Page title, empty when unknown
    pub title: String,
    /// Canonical tag string, `,` when untagged
    pub tags: String,
    /// Free-text description
    pub description: String,
    /// Flag bitmask
    pub flags: i64,
}

impl Bookmark {
    /// Create an untagged record with the given id and URL
    pub fn new(id: i64, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            title: String::new(),
            tags: DELIM_STR.to_string(),
            description: String::new(),
            flags: FLAG_NONE,
        }
    }

    /// Whether network refresh is disabled for the title
    pub fn is_immutable(&self) -> bool {
        self.flags & FLAG_IMMUTABLE != 0
    }

    /// Individual tags, in stored (sorted) order
    pub fn tag_list(&self) -> Vec<&str> {
        tags::split(&self.tags).collect()
    }

    /// Tags without the wrapping delimiters, for display
    pub fn tags_display(&self) -> &str {
        self.tags.trim_matches(tags::DELIM)
    }
}

/// A record about to be inserted; the store assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBookmark {
    pub url: String,
    pub title: String,
    pub tags: String,
    pub description: String,
    pub flags: i64,
}

impl NewBookmark {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            tags: DELIM_STR.to_string(),
            description: String::new(),
            flags: FLAG_NONE,
        }
    }
}

/// Fields to write on an existing record; `None` leaves a column alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldUpdate {
    pub url: Option<String>,
    pub title: Option<String>,
    pub tags: Option<String>,
    pub description: Option<String>,
    pub immutable: Option<bool>,
}

impl FieldUpdate {
    /// Nothing to write
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.title.is_none()
            && self.tags.is_none()
            && self.description.is_none()
            && self.immutable.is_none()
    }
}
