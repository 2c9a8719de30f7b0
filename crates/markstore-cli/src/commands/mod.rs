//! Command handlers

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use markstore_core::{StatusSet, StatusTag};

pub mod bookmark;
pub mod config;
pub mod search;
pub mod status;
pub mod tag;
pub mod transfer;

/// Status range used when `--del-error` or `--export-on` has no value
const ERROR_STATUSES: &str = "400-599";

/// Options that act on the HTTP status of a fetch
#[derive(Args, Debug, Clone, Default)]
pub struct NetworkArgs {
    /// Store the URL reached after permanent redirects
    #[arg(long)]
    pub url_redirect: bool,

    /// Tag permanent redirects; `{}` in PATTERN becomes the status (default "http:{}")
    #[arg(long, value_name = "PATTERN", num_args = 0..=1, default_missing_value = "")]
    pub tag_redirect: Option<String>,

    /// Tag HTTP errors; `{}` in PATTERN becomes the status (default "http:{}")
    #[arg(long, value_name = "PATTERN", num_args = 0..=1, default_missing_value = "")]
    pub tag_error: Option<String>,

    /// Delete bookmarks answering with these statuses, e.g. "404,500-599"
    #[arg(long, value_name = "CODES", num_args = 0..=1, default_missing_value = ERROR_STATUSES)]
    pub del_error: Option<String>,
}

impl NetworkArgs {
    pub fn tag_redirect(&self) -> StatusTag {
        status_tag(self.tag_redirect.as_deref())
    }

    pub fn tag_error(&self) -> StatusTag {
        status_tag(self.tag_error.as_deref())
    }

    pub fn del_error(&self) -> Result<Option<StatusSet>> {
        status_set(self.del_error.as_deref())
    }
}

/// Write records seen by a refresh to a file
#[derive(Args, Debug, Clone, Default)]
pub struct CaptureArgs {
    /// Capture bookmarks answering with these statuses
    #[arg(long, value_name = "CODES", num_args = 0..=1, default_missing_value = ERROR_STATUSES, requires = "export")]
    pub export_on: Option<String>,

    /// File receiving the captured bookmarks (.json or .db)
    #[arg(long, value_name = "FILE", requires = "export_on")]
    pub export: Option<PathBuf>,
}

impl CaptureArgs {
    pub fn export_on(&self) -> Result<Option<StatusSet>> {
        status_set(self.export_on.as_deref())
    }
}

fn status_tag(arg: Option<&str>) -> StatusTag {
    match arg {
        None => StatusTag::Off,
        Some("") => StatusTag::Default,
        Some(pattern) => StatusTag::Pattern(pattern.to_string()),
    }
}

fn status_set(arg: Option<&str>) -> Result<Option<StatusSet>> {
    Ok(arg.map(StatusSet::parse).transpose()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tag() {
        assert_eq!(status_tag(None), StatusTag::Off);
        assert_eq!(status_tag(Some("")), StatusTag::Default);
        assert_eq!(
            status_tag(Some("dead:{}")),
            StatusTag::Pattern("dead:{}".to_string())
        );
    }

    #[test]
    fn test_status_set() {
        assert!(status_set(None).unwrap().is_none());
        let set = status_set(Some(ERROR_STATUSES)).unwrap().unwrap();
        assert!(set.contains(Some(404)));
        assert!(!set.contains(Some(301)));
        assert!(status_set(Some("abc")).is_err());
    }
}
