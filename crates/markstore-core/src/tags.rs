//! Tag canonicalization
//!
//! Tags are stored as one string per bookmark: lowercase, deduplicated,
//! sorted and wrapped in the delimiter on both ends (`,rust,web,`). An
//! empty tag set is the bare delimiter (`,`), never an empty string.
//!
//! Wrapping makes substring matching exact: a search for `,a,` can never
//! hit a stored `,cat,`.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::storage::{StoreError, StoreResult};

/// Delimiter between tags in the stored form
pub const DELIM: char = ',';

/// The stored form of an empty tag set
pub const DELIM_STR: &str = ",";

/// Escape character used with `LIKE ... ESCAPE`
pub const LIKE_ESCAPE: char = '`';

/// Canonicalize raw tag tokens
///
/// Every token is split on the delimiter, trimmed and lowercased; empty
/// pieces are dropped and the rest are deduplicated and sorted.
pub fn canonicalize<I, S>(tokens: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let set: BTreeSet<String> = tokens
        .into_iter()
        .flat_map(|token| {
            token
                .as_ref()
                .split(DELIM)
                .map(|piece| piece.trim().to_lowercase())
                .collect::<Vec<_>>()
        })
        .filter(|piece| !piece.is_empty())
        .collect();

    if set.is_empty() {
        return DELIM_STR.to_string();
    }

    let joined: Vec<&str> = set.iter().map(String::as_str).collect();
    format!("{DELIM}{}{DELIM}", joined.join(DELIM_STR))
}

/// Wrap a single token in delimiters, adding only what is missing
pub fn wrap(token: &str) -> String {
    if token.trim().is_empty() {
        return DELIM_STR.to_string();
    }

    let mut wrapped = String::with_capacity(token.len() + 2);
    if !token.starts_with(DELIM) {
        wrapped.push(DELIM);
    }
    wrapped.push_str(token);
    if !token.ends_with(DELIM) {
        wrapped.push(DELIM);
    }
    wrapped
}

/// Whether a stored tag string holds no tags
pub fn is_empty_set(tags: &str) -> bool {
    tags == DELIM_STR
}

/// Iterate the individual tags of a stored tag string
pub fn split(tags: &str) -> impl Iterator<Item = &str> {
    tags.split(DELIM).filter(|t| !t.is_empty())
}

/// Escape `LIKE` wildcards so the pattern matches literally
pub fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Date tag in `YYYYMonDD` form, e.g. `2024Jan05`
pub fn auto_tag(date: NaiveDate) -> String {
    date.format("%Y%b%d").to_string()
}

/// Tag argument of an update
///
/// A leading `+` appends, a leading `-` removes, anything else replaces
/// the whole tag set. The payload is always canonical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEdit {
    Replace(String),
    Append(String),
    Remove(String),
}

impl TagEdit {
    /// Parse a tag argument
    pub fn parse(arg: &str) -> StoreResult<Self> {
        let arg = arg.trim_start();

        let (append, rest) = if let Some(rest) = arg.strip_prefix('+') {
            (true, rest)
        } else if let Some(rest) = arg.strip_prefix('-') {
            (false, rest)
        } else {
            return Ok(TagEdit::Replace(canonicalize([arg])));
        };

        let tags = canonicalize([rest]);
        if is_empty_set(&tags) {
            return Err(StoreError::InvalidArgument(
                "please specify a tag to add or remove".to_string(),
            ));
        }
        Ok(if append {
            TagEdit::Append(tags)
        } else {
            TagEdit::Remove(tags)
        })
    }
}
