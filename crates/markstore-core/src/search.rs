//! Search query construction
//!
//! Keyword searches match against url, title, tags and description:
//!
//! - **Any**: records matching at least one keyword, best score first
//! - **All**: records matching every keyword, by id
//! - **Regex**: each keyword is a case-insensitive regex, scored like Any
//!
//! Shallow matching is word-bounded (`\b`) on alphanumeric token edges;
//! deep matching is plain substring. Tag searches match the
//! delimiter-wrapped form so `a` never hits `cat`.

use std::collections::HashSet;

use regex::Regex;
use rusqlite::params_from_iter;
use tracing::debug;

use crate::models::{Bookmark, FLAG_IMMUTABLE};
use crate::storage::bookmarks::COLUMNS;
use crate::storage::{BookmarkStore, StoreError, StoreResult};
use crate::tags::{self, like_escape, wrap, LIKE_ESCAPE};

/// Keyword combination mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Any,
    All,
    Regex,
}

/// Query builder and runner over a [`BookmarkStore`]
pub struct SearchEngine<'a> {
    store: &'a BookmarkStore,
}

impl<'a> SearchEngine<'a> {
    pub fn new(store: &'a BookmarkStore) -> Self {
        Self { store }
    }

    /// Search url, title, tags and description for keywords
    ///
    /// Empty keywords are ignored; with none left the result is empty.
    pub fn search<S: AsRef<str>>(
        &self,
        keywords: &[S],
        mode: SearchMode,
        deep: bool,
    ) -> StoreResult<Vec<Bookmark>> {
        let tokens: Vec<&str> = keywords
            .iter()
            .map(|k| k.as_ref())
            .filter(|k| !k.is_empty())
            .collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        if mode == SearchMode::All && tokens.len() == 1 {
            match tokens[0] {
                "blank" => {
                    return self.store.select(
                        &format!(
                            "SELECT {COLUMNS} FROM bookmarks
                             WHERE title = '' OR title IS NULL OR tags = ?1 ORDER BY id ASC"
                        ),
                        [tags::DELIM_STR],
                    )
                }
                "immutable" => {
                    return self.store.select(
                        &format!(
                            "SELECT {COLUMNS} FROM bookmarks
                             WHERE flags & {FLAG_IMMUTABLE} = {FLAG_IMMUTABLE} ORDER BY id ASC"
                        ),
                        [],
                    )
                }
                _ => {}
            }
        }

        if mode == SearchMode::Regex {
            for token in &tokens {
                Regex::new(token).map_err(|e| {
                    StoreError::InvalidArgument(format!("invalid regex '{}': {}", token, e))
                })?;
            }
        }

        let use_like = deep && mode != SearchMode::Regex;
        let clause = |p: &str| {
            if use_like {
                like_clause(p)
            } else {
                regexp_clause(p)
            }
        };
        let patterns: Vec<String> = tokens
            .iter()
            .map(|t| match mode {
                SearchMode::Regex => t.to_string(),
                _ if deep => format!("%{}%", like_escape(t)),
                _ => word_pattern(t),
            })
            .collect();

        let mut args: Vec<&str> = Vec::with_capacity(patterns.len() * 4);
        for pattern in &patterns {
            args.extend([pattern.as_str(); 4]);
        }

        let sql = if mode == SearchMode::All {
            let conditions: Vec<String> = patterns.iter().map(|_| clause("?")).collect();
            format!(
                "SELECT {COLUMNS} FROM bookmarks WHERE {} ORDER BY id ASC",
                conditions.join(" AND ")
            )
        } else {
            scored_query(patterns.iter().map(|_| clause("?")).collect(), None)
        };

        debug!(query = %sql, args = ?args, "Keyword search");
        self.store.select(&sql, params_from_iter(args))
    }

    /// Search by tag expression
    ///
    /// `a,b` matches any tag (scored), `a+b` matches all tags (by id);
    /// mixing the two is an error. A `" - "` suffix lists tags that
    /// disqualify a record; an expression starting with `"- "` returns
    /// everything except records carrying the listed tags.
    pub fn search_by_tag(&self, expr: &str) -> StoreResult<Vec<Bookmark>> {
        let query = TagQuery::parse(expr)?;
        let escape = format!("LIKE ? ESCAPE '{LIKE_ESCAPE}'");

        let mut args: Vec<String> = query
            .include
            .iter()
            .map(|t| format!("%{}%", like_escape(t)))
            .collect();

        let sql = match query.op {
            TagOp::None => {
                let Some(exclude) = query.exclude else {
                    return Ok(Vec::new());
                };
                args.push(exclude);
                format!("SELECT {COLUMNS} FROM bookmarks WHERE tags NOT REGEXP ? ORDER BY id ASC")
            }
            TagOp::All => {
                let conditions: Vec<String> = query
                    .include
                    .iter()
                    .map(|_| format!("tags {escape}"))
                    .collect();
                let mut sql = format!(
                    "SELECT {COLUMNS} FROM bookmarks WHERE ({})",
                    conditions.join(" AND ")
                );
                if let Some(exclude) = query.exclude {
                    args.push(exclude);
                    sql.push_str(" AND tags NOT REGEXP ?");
                }
                sql.push_str(" ORDER BY id ASC");
                sql
            }
            TagOp::Any => {
                let cases = query
                    .include
                    .iter()
                    .map(|_| format!("tags {escape}"))
                    .collect();
                let exclude = query.exclude.map(|exclude| {
                    args.push(exclude);
                    "tags NOT REGEXP ?"
                });
                scored_query(cases, exclude)
            }
        };

        debug!(query = %sql, args = ?args, "Tag search");
        self.store.select(&sql, params_from_iter(args))
    }

    /// Keyword search filtered by a tag expression
    ///
    /// Both searches run independently and are intersected, so neither
    /// side's ranking survives: results come back ordered by id.
    pub fn search_with_tags<S: AsRef<str>>(
        &self,
        keywords: &[S],
        mode: SearchMode,
        deep: bool,
        tag_expr: &str,
    ) -> StoreResult<Vec<Bookmark>> {
        let by_keyword = self.search(keywords, mode, deep)?;
        let by_tag: HashSet<i64> = self
            .search_by_tag(tag_expr)?
            .into_iter()
            .map(|bm| bm.id)
            .collect();

        let mut results: Vec<Bookmark> = by_keyword
            .into_iter()
            .filter(|bm| by_tag.contains(&bm.id))
            .collect();
        results.sort_by_key(|bm| bm.id);
        Ok(results)
    }

    /// Drop results matching any of `without` (Any mode)
    pub fn exclude<S: AsRef<str>>(
        &self,
        results: Vec<Bookmark>,
        without: &[S],
        deep: bool,
    ) -> StoreResult<Vec<Bookmark>> {
        let unwanted: HashSet<i64> = self
            .search(without, SearchMode::Any, deep)?
            .into_iter()
            .map(|bm| bm.id)
            .collect();

        Ok(results
            .into_iter()
            .filter(|bm| !unwanted.contains(&bm.id))
            .collect())
    }
}

fn regexp_clause(p: &str) -> String {
    format!("(tags REGEXP {p} OR url REGEXP {p} OR title REGEXP {p} OR description REGEXP {p})")
}

fn like_clause(p: &str) -> String {
    let e = LIKE_ESCAPE;
    format!(
        "(tags LIKE {p} ESCAPE '{e}' OR url LIKE {p} ESCAPE '{e}' \
         OR title LIKE {p} ESCAPE '{e}' OR description LIKE {p} ESCAPE '{e}')"
    )
}

/// Sum one point per matching condition, best score first
fn scored_query(conditions: Vec<String>, filter: Option<&str>) -> String {
    let score = conditions
        .iter()
        .map(|c| format!("CASE WHEN {c} THEN 1 ELSE 0 END"))
        .collect::<Vec<_>>()
        .join(" + ");
    let filter = filter.map(|f| format!(" AND {f}")).unwrap_or_default();

    format!(
        "SELECT {COLUMNS} FROM (SELECT *, {score} AS score FROM bookmarks) \
         WHERE score > 0{filter} ORDER BY score DESC, id ASC"
    )
}

/// Regex matching `token` literally, word-bounded at alphanumeric edges
fn word_pattern(token: &str) -> String {
    let pre = match token.chars().next() {
        Some(c) if c.is_alphanumeric() => r"\b",
        _ => "",
    };
    let post = match token.chars().last() {
        Some(c) if c.is_alphanumeric() => r"\b",
        _ => "",
    };
    format!("{pre}{}{post}", regex::escape(token.trim_end_matches('/')))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagOp {
    /// Exclusion list only
    None,
    Any,
    All,
}

/// A parsed tag expression
#[derive(Debug, Clone, PartialEq, Eq)]
struct TagQuery {
    /// Wrapped, lowercase tags to match
    include: Vec<String>,
    op: TagOp,
    /// Regex alternation over wrapped excluded tags
    exclude: Option<String>,
}

impl TagQuery {
    fn parse(expr: &str) -> StoreResult<Self> {
        let (exclude_only, mut expr) = match expr.strip_prefix("- ") {
            Some(rest) => (true, rest),
            None => (false, expr),
        };

        for prefix in ["+ ", ", "] {
            if let Some(rest) = expr.strip_prefix(prefix) {
                expr = rest;
            }
        }
        for suffix in [" -", " +", " ,"] {
            if let Some(rest) = expr.strip_suffix(suffix) {
                expr = rest;
            }
        }

        let (include, exclude) = if exclude_only {
            ("", Some(expr))
        } else {
            match expr.split_once(" - ") {
                Some((include, exclude)) => (include, Some(exclude)),
                None => (expr, None),
            }
        };

        let exclude = exclude.and_then(|list| {
            let alternatives: Vec<String> = list
                .split(tags::DELIM)
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .map(|t| regex::escape(&wrap(&t)))
                .collect();
            (!alternatives.is_empty()).then(|| alternatives.join("|"))
        });

        if include.contains('+') && include.contains(tags::DELIM) {
            return Err(StoreError::InvalidArgument(
                "cannot use both '+' and ',' in the same tag search".to_string(),
            ));
        }

        let op = if include.contains('+') {
            TagOp::All
        } else {
            TagOp::Any
        };
        let delimiter = if op == TagOp::All { '+' } else { tags::DELIM };

        let include: Vec<String> = include
            .split(delimiter)
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .map(|t| wrap(&t))
            .collect();

        let op = if include.is_empty() { TagOp::None } else { op };
        Ok(Self { include, op, exclude })
    }
}
